//! Crash-recovery snapshots for gambit.
//!
//! The session layer periodically projects its active rooms into
//! [`RoomSnapshot`]s and hands them to a [`SnapshotWriter`]. At process
//! start the [`SnapshotStore`] reads the file back exactly once.
//!
//! Snapshots are advisory: a failed write is logged, a missing or corrupt
//! file means starting with no rooms.

mod error;
mod schema;
mod store;
mod writer;

use std::path::PathBuf;
use std::time::Duration;

pub use error::SnapshotError;
pub use schema::{RemainingTimes, RoomSnapshot, SNAPSHOT_VERSION, SeatRecord, SeatRecords};
pub use store::SnapshotStore;
pub use writer::SnapshotWriter;

/// Where and how often to snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Snapshot file. Default: `gambit-snapshot.json` in the working
    /// directory.
    pub path: PathBuf,
    /// Periodic snapshot interval. Default: 30 seconds.
    pub interval: Duration,
    /// Rooms idle for longer than this are not persisted. Default: 2 hours.
    pub retention: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gambit-snapshot.json"),
            interval: Duration::from_secs(30),
            retention: Duration::from_secs(2 * 60 * 60),
        }
    }
}
