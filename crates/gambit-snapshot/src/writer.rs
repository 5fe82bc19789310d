//! Background snapshot writer.
//!
//! The session loop must never wait on disk. It hands finished projections
//! to a [`SnapshotWriter`], and a dedicated task writes them. Submissions
//! go through a `watch` channel: if several arrive while a write is in
//! flight, only the newest is written next.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{RoomSnapshot, SnapshotStore};

#[derive(Debug, Clone)]
struct Batch {
    rooms: Vec<RoomSnapshot>,
    now_ms: u64,
}

/// Handle to the writer task.
#[derive(Debug)]
pub struct SnapshotWriter {
    tx: watch::Sender<Option<Batch>>,
    task: JoinHandle<()>,
}

impl SnapshotWriter {
    /// Spawns the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(store: SnapshotStore) -> Self {
        let (tx, mut rx) = watch::channel::<Option<Batch>>(None);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let batch = rx.borrow_and_update().clone();
                if let Some(batch) = batch {
                    store.save(&batch.rooms, batch.now_ms).await;
                }
            }
        });
        Self { tx, task }
    }

    /// Queues a snapshot, replacing any not yet written.
    pub fn submit(&self, rooms: Vec<RoomSnapshot>, now_ms: u64) {
        // Fails only if the task is gone, and then there is nobody to write.
        let _ = self.tx.send(Some(Batch { rooms, now_ms }));
    }

    /// Writes anything still queued, then stops the task.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "snapshot writer task failed");
        }
    }
}
