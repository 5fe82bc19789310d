//! # gambit
//!
//! A server for two-player, turn-based chess sessions over WebSockets.
//!
//! Players authenticate, open a room, share its code, and play. The server
//! is authoritative: it validates every move, runs the clocks, settles
//! games, and keeps a room alive while a player reconnects. Active rooms
//! survive a restart through periodic snapshots, and finished games are
//! mirrored to a [`MatchStore`] on a best-effort basis.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gambit::prelude::*;
//!
//! # async fn run() -> Result<(), GambitError> {
//! let server = GambitServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(ChessRules, DevVerifier, MemoryStore::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod actor;
mod error;
mod handler;
mod server;

pub use error::GambitError;
pub use server::{GambitServer, GambitServerBuilder, SessionHandle};

pub use gambit_protocol::{ClientEvent, Color, Identity, RoomCode, ServerEvent, TimeControl};
pub use gambit_room::{ChessRules, RulesEngine};
pub use gambit_session::{
    AuthError, AuthVerifier, DevVerifier, MatchStore, MemoryStore, SessionConfig,
};
pub use gambit_snapshot::SnapshotConfig;

/// Everything needed to start a server.
pub mod prelude {
    pub use crate::{
        AuthError, AuthVerifier, ChessRules, DevVerifier, GambitError, GambitServer,
        GambitServerBuilder, Identity, MatchStore, MemoryStore, SessionConfig, SnapshotConfig,
    };
}
