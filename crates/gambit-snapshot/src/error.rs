//! Error types for snapshot persistence.

/// Errors from reading or writing the snapshot file.
///
/// None of these reach a player: [`SnapshotStore::save`] logs and drops
/// them, and [`SnapshotStore::load`] treats them as "no snapshot".
///
/// [`SnapshotStore::save`]: crate::SnapshotStore::save
/// [`SnapshotStore::load`]: crate::SnapshotStore::load
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but is not a snapshot document.
    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}
