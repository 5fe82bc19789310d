//! The session actor: the one task that owns the [`SessionManager`].
//!
//! Connection handlers never touch rooms. They send [`Command`]s down an
//! unbounded channel and the actor applies them one at a time, so every
//! room mutation is serialized without a lock. Periodic jobs (clock
//! sweep, room removal, snapshots) run on the same task between commands.
//!
//! ```text
//! handler ──Command──→ [queue] ──→ actor ──→ SessionManager ──→ outboxes
//!                                    ├── sweep tick ──→ sweep_clocks / remove_expired
//!                                    ├── snapshot tick ──→ SnapshotWriter
//!                                    └── store lookup (spawned) ──LookupFinished──┘
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gambit_protocol::{ClientEvent, ConnectionId, Identity, RoomCode};
use gambit_room::RulesEngine;
use gambit_session::{Dispatch, Mirror, Outbox, SessionManager, StoredMatch};
use gambit_snapshot::SnapshotWriter;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Work for the actor.
#[derive(Debug)]
pub(crate) enum Command {
    /// A connection finished authenticating.
    Attach {
        conn: ConnectionId,
        identity: Identity,
        outbox: Outbox,
    },
    Event {
        conn: ConnectionId,
        event: ClientEvent,
    },
    /// The connection is gone.
    Disconnect { conn: ConnectionId },
    /// A store lookup started by a join has returned.
    LookupFinished {
        conn: ConnectionId,
        code: RoomCode,
        stored: Option<StoredMatch>,
    },
    /// Write a final snapshot and stop.
    Shutdown { done: oneshot::Sender<()> },
}

pub(crate) type CommandSender = mpsc::UnboundedSender<Command>;

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

pub(crate) struct SessionActor<E: RulesEngine> {
    pub(crate) manager: SessionManager<E>,
    pub(crate) mirror: Mirror,
    pub(crate) writer: SnapshotWriter,
    pub(crate) sweep_interval: Duration,
    pub(crate) snapshot_interval: Duration,
}

impl<E: RulesEngine> SessionActor<E> {
    /// Runs until [`Command::Shutdown`] arrives or every sender is gone.
    ///
    /// `commands` is the receiving half of `self_tx`; the actor keeps only
    /// a weak handle to itself so it does not keep its own queue open.
    pub(crate) async fn run(
        mut self,
        self_tx: mpsc::WeakUnboundedSender<Command>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let start = Instant::now() + self.snapshot_interval;
        let mut snapshots = tokio::time::interval_at(start, self.snapshot_interval);
        snapshots.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut done = None;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { done: reply }) => {
                        done = Some(reply);
                        break;
                    }
                    Some(command) => self.apply(command, &self_tx),
                    None => break,
                },
                _ = sweep.tick() => {
                    let now = Instant::now();
                    let settled = self.manager.sweep_clocks(now);
                    if settled > 0 {
                        debug!(rooms = settled, "clock sweep settled rooms");
                    }
                    self.manager.remove_expired(now);
                }
                _ = snapshots.tick() => self.submit_snapshot(),
            }
            if self.manager.take_snapshot_request() {
                self.submit_snapshot();
            }
        }

        self.submit_snapshot();
        self.writer.close().await;
        info!(rooms = self.manager.room_count(), "session actor stopped");
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn apply(&mut self, command: Command, self_tx: &mpsc::WeakUnboundedSender<Command>) {
        let now = Instant::now();
        match command {
            Command::Attach {
                conn,
                identity,
                outbox,
            } => self.manager.attach(conn, identity, outbox),
            Command::Event { conn, event } => {
                if let Dispatch::Lookup(code) =
                    self.manager.handle_event(conn, event, now, unix_ms())
                {
                    self.spawn_lookup(conn, code, self_tx.clone());
                }
            }
            Command::Disconnect { conn } => self.manager.disconnect(conn),
            Command::LookupFinished { conn, code, stored } => {
                self.manager.finish_lookup(conn, &code, stored, now);
            }
            Command::Shutdown { .. } => {}
        }
    }

    /// Asks the store for `code` off the actor task; the answer comes back
    /// as a [`Command::LookupFinished`].
    fn spawn_lookup(
        &self,
        conn: ConnectionId,
        code: RoomCode,
        self_tx: mpsc::WeakUnboundedSender<Command>,
    ) {
        debug!(%conn, %code, "room not in memory, asking the store");
        let reply = self.mirror.lookup(code.clone());
        tokio::spawn(async move {
            let stored = reply.await.unwrap_or(None);
            if let Some(tx) = self_tx.upgrade() {
                let _ = tx.send(Command::LookupFinished { conn, code, stored });
            }
        });
    }

    fn submit_snapshot(&self) {
        let rooms = self.manager.snapshot(Instant::now(), unix_ms());
        self.writer.submit(rooms, unix_ms());
    }
}
