//! `GambitServer` builder and server loop.
//!
//! This is the entry point for running a gambit server. It ties together
//! all the layers: transport → protocol → session → room, plus the
//! snapshot writer and the store mirror.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gambit_protocol::{Codec, JsonCodec};
use gambit_room::RulesEngine;
use gambit_session::{AuthVerifier, MatchStore, Mirror, SessionConfig, SessionManager};
use gambit_snapshot::{SnapshotConfig, SnapshotStore, SnapshotWriter};
use gambit_transport::{Transport, WebSocketTransport};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::GambitError;
use crate::actor::{Command, CommandSender, SessionActor, unix_ms};
use crate::handler::handle_connection;

/// State shared by every connection handler task.
pub(crate) struct Shared<A: AuthVerifier, C: Codec> {
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) commands: CommandSender,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a gambit server.
///
/// # Example
///
/// ```rust,no_run
/// use gambit::{ChessRules, DevVerifier, GambitServer, MemoryStore};
///
/// # async fn run() -> Result<(), gambit::GambitError> {
/// let server = GambitServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(ChessRules, DevVerifier, MemoryStore::new())
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GambitServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    snapshot_config: SnapshotConfig,
    clock_sweep_interval: Duration,
    handshake_timeout: Duration,
    idle_timeout: Duration,
}

impl GambitServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            snapshot_config: SnapshotConfig::default(),
            clock_sweep_interval: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn snapshot_config(mut self, config: SnapshotConfig) -> Self {
        self.snapshot_config = config;
        self
    }

    /// How often timed rooms are checked for an exhausted clock.
    pub fn clock_sweep_interval(mut self, interval: Duration) -> Self {
        self.clock_sweep_interval = interval;
        self
    }

    /// How long a new connection has to send `authenticate`.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// A connection that sends nothing for this long is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener, restores rooms from the snapshot file, and
    /// starts the session actor.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    ///
    /// # Errors
    /// Returns `GambitError::Transport` if the address cannot be bound.
    pub async fn build<E, A, S>(
        self,
        engine: E,
        auth: A,
        store: S,
    ) -> Result<GambitServer<A, JsonCodec>, GambitError>
    where
        E: RulesEngine,
        A: AuthVerifier,
        S: MatchStore,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let mirror = Mirror::spawn(Arc::new(store), self.session_config.store_timeout);
        let mut manager = SessionManager::new(engine, self.session_config, mirror.clone());

        let snapshots = SnapshotStore::new(&self.snapshot_config);
        let now_ms = unix_ms();
        let restored = manager.restore(snapshots.load(now_ms).await, Instant::now(), now_ms);
        debug!(rooms = restored, path = %snapshots.path().display(), "snapshot loaded");

        let (commands, rx) = mpsc::unbounded_channel();
        let actor = SessionActor {
            manager,
            mirror: mirror.clone(),
            writer: SnapshotWriter::spawn(snapshots),
            sweep_interval: self.clock_sweep_interval,
            snapshot_interval: self.snapshot_config.interval,
        };
        tokio::spawn(actor.run(commands.downgrade(), rx));

        let shared = Arc::new(Shared {
            auth,
            codec: JsonCodec,
            commands: commands.clone(),
            handshake_timeout: self.handshake_timeout,
            idle_timeout: self.idle_timeout,
        });

        Ok(GambitServer {
            transport,
            shared,
            handle: SessionHandle { commands, mirror },
        })
    }
}

impl Default for GambitServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A cheap handle onto a running server's session layer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: CommandSender,
    mirror: Mirror,
}

impl SessionHandle {
    /// Whether the most recent write to the match store succeeded.
    pub fn persistence_available(&self) -> bool {
        self.mirror.is_available()
    }

    /// Writes a final snapshot and stops the session actor. Connections
    /// still open are no longer served.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).is_ok() {
            let _ = wait.await;
        }
    }
}

/// A running gambit server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GambitServer<A: AuthVerifier, C: Codec> {
    transport: WebSocketTransport,
    shared: Arc<Shared<A, C>>,
    handle: SessionHandle,
}

impl GambitServer<gambit_session::DevVerifier, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> GambitServerBuilder {
        GambitServerBuilder::new()
    }
}

impl<A, C> GambitServer<A, C>
where
    A: AuthVerifier,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), GambitError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then writes a final
    /// snapshot and stops the session actor.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), GambitError> {
        info!(addr = ?self.transport.local_addr().ok(), "gambit server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, shared).await {
                                debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                    }
                },
            }
        }

        info!("shutting down");
        self.handle.shutdown().await;
        Ok(())
    }
}
