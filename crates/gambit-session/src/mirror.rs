//! Fire-and-forget mirroring to the [`MatchStore`].
//!
//! The session loop calls [`Mirror::write`] after it has already mutated
//! and broadcast, and never waits for the result. A dispatcher task hands
//! writes to a writer task over a bounded backlog and spawns every lookup
//! on its own, so a stalled write never delays a lookup. The writer
//! applies writes in order, each bounded by a timeout. When the backlog
//! is full, new writes are dropped and counted. Failures are logged and
//! flip the capability flag returned by [`Mirror::is_available`]; they
//! never reach a player.
//!
//! ```text
//! SessionManager ──write()──→ dispatcher ──[backlog]──→ writer ──timeout(store.write)
//!                ──lookup()─→            ──spawn──────→ timeout(store.load_match)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use gambit_protocol::RoomCode;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{MatchStore, StoreError, StoredMatch, StoreWrite};

/// Writes that may wait for the store before new ones are dropped.
pub const DEFAULT_WRITE_BACKLOG: usize = 1024;

/// A request sent to the dispatcher.
#[derive(Debug)]
pub enum MirrorRequest {
    Write(StoreWrite),
    Lookup {
        code: RoomCode,
        reply: oneshot::Sender<Option<StoredMatch>>,
    },
}

#[derive(Debug)]
struct Health {
    available: AtomicBool,
    dropped: AtomicU64,
}

impl Health {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
        })
    }

    fn set_available(&self, up: bool) {
        self.available.store(up, Ordering::Relaxed);
    }
}

/// Handle to the store workers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Mirror {
    tx: mpsc::UnboundedSender<MirrorRequest>,
    health: Arc<Health>,
}

impl Mirror {
    /// Spawns the workers for `store` with [`DEFAULT_WRITE_BACKLOG`]. Must
    /// be called inside a Tokio runtime.
    pub fn spawn<S: MatchStore>(store: Arc<S>, timeout: Duration) -> Self {
        Self::with_backlog(store, timeout, DEFAULT_WRITE_BACKLOG)
    }

    /// Like [`spawn`](Self::spawn), holding at most `backlog` pending
    /// writes.
    pub fn with_backlog<S: MatchStore>(store: Arc<S>, timeout: Duration, backlog: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (writes_tx, writes_rx) = mpsc::channel(backlog.max(1));
        let health = Health::new();
        tokio::spawn(apply_writes(
            Arc::clone(&store),
            timeout,
            Arc::clone(&health),
            writes_rx,
        ));
        tokio::spawn(dispatch(store, timeout, Arc::clone(&health), rx, writes_tx));
        Self { tx, health }
    }

    /// A mirror with no worker. Requests land on the returned receiver,
    /// which lets callers inspect or drive them by hand.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<MirrorRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                health: Health::new(),
            },
            rx,
        )
    }

    /// Queues a write. Never blocks.
    pub fn write(&self, op: StoreWrite) {
        if self.tx.send(MirrorRequest::Write(op)).is_err() {
            self.health.set_available(false);
        }
    }

    /// Starts a lookup. The receiver yields `None` when the match is
    /// unknown or the store could not be reached in time.
    pub fn lookup(&self, code: RoomCode) -> oneshot::Receiver<Option<StoredMatch>> {
        let (reply, rx) = oneshot::channel();
        // If the worker is gone `reply` is dropped and the receiver
        // resolves to an error, which callers treat as `None`.
        let _ = self.tx.send(MirrorRequest::Lookup { code, reply });
        rx
    }

    /// Whether the most recent store call succeeded.
    pub fn is_available(&self) -> bool {
        self.health.available.load(Ordering::Relaxed)
    }

    /// Writes discarded because the backlog was full.
    pub fn dropped_writes(&self) -> u64 {
        self.health.dropped.load(Ordering::Relaxed)
    }
}

async fn bounded<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(StoreError::Timeout(timeout)))
}

/// Never awaits the store, so requests are picked up as fast as they
/// arrive.
async fn dispatch<S: MatchStore>(
    store: Arc<S>,
    timeout: Duration,
    health: Arc<Health>,
    mut rx: mpsc::UnboundedReceiver<MirrorRequest>,
    writes: mpsc::Sender<StoreWrite>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            MirrorRequest::Write(op) => match writes.try_send(op) {
                Ok(()) => {}
                Err(TrySendError::Full(op)) => {
                    let dropped = health.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    health.set_available(false);
                    warn!(op = op.kind(), dropped, "mirror backlog full, write dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    health.set_available(false);
                }
            },
            MirrorRequest::Lookup { code, reply } => {
                let store = Arc::clone(&store);
                let health = Arc::clone(&health);
                tokio::spawn(async move {
                    let found = match bounded(timeout, store.load_match(&code)).await {
                        Ok(found) => {
                            health.set_available(true);
                            found
                        }
                        Err(e) => {
                            warn!(%code, error = %e, "match lookup failed");
                            health.set_available(false);
                            None
                        }
                    };
                    let _ = reply.send(found);
                });
            }
        }
    }
    debug!("mirror dispatcher stopped");
}

async fn apply_writes<S: MatchStore>(
    store: Arc<S>,
    timeout: Duration,
    health: Arc<Health>,
    mut rx: mpsc::Receiver<StoreWrite>,
) {
    while let Some(op) = rx.recv().await {
        let kind = op.kind();
        match bounded(timeout, store.write(op)).await {
            Ok(()) => {
                debug!(op = kind, "mirror write applied");
                health.set_available(true);
            }
            Err(e) => {
                warn!(op = kind, error = %e, "mirror write failed");
                health.set_available(false);
            }
        }
    }
    debug!("mirror writer stopped");
}
