//! gambit-server: runs a chess session server.
//!
//! Configuration comes from the environment:
//!
//! - `GAMBIT_BIND`: listen address (default `127.0.0.1:8080`)
//! - `GAMBIT_SNAPSHOT_PATH`: snapshot file (default `gambit-snapshot.json`)
//! - `GAMBIT_SHARE_LINK_BASE`: prefix for share links
//! - `RUST_LOG`: log filter (default `info`)
//!
//! Tokens are checked with the development verifier and matches are kept
//! in memory only.

use std::path::PathBuf;

use gambit::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = std::env::var("GAMBIT_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let mut session = SessionConfig::default();
    if let Ok(base) = std::env::var("GAMBIT_SHARE_LINK_BASE") {
        session.share_link_base = base;
    }
    let mut snapshot = SnapshotConfig::default();
    if let Ok(path) = std::env::var("GAMBIT_SNAPSHOT_PATH") {
        snapshot.path = PathBuf::from(path);
    }

    let server = GambitServer::builder()
        .bind(&bind)
        .session_config(session)
        .snapshot_config(snapshot)
        .build(ChessRules, DevVerifier, MemoryStore::new())
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await?;
    Ok(())
}
