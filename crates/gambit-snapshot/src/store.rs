//! File-backed snapshot store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::schema::{
    RoomSnapshot, SNAPSHOT_VERSION, SnapshotDocument, SnapshotFileRef,
};
use crate::{SnapshotConfig, SnapshotError};

/// Reads and writes the snapshot file.
///
/// Writes replace the whole file atomically (write a sibling temp file,
/// then rename over the target), so a crash mid-write leaves the previous
/// snapshot intact.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    retention: Duration,
}

impl SnapshotStore {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            path: config.path.clone(),
            retention: config.retention,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn retention_ms(&self) -> u64 {
        u64::try_from(self.retention.as_millis()).unwrap_or(u64::MAX)
    }

    fn keep(&self, room: &RoomSnapshot, now_ms: u64) -> bool {
        !room.is_terminal && room.outcome.is_none() && room.is_fresh(now_ms, self.retention_ms())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes every non-terminal room active within the retention window.
    /// Returns how many rooms were written.
    ///
    /// # Errors
    /// Returns `SnapshotError::Io` or `SnapshotError::Encode`. The previous
    /// file is untouched on error.
    pub async fn try_save(&self, rooms: &[RoomSnapshot], now_ms: u64) -> Result<usize, SnapshotError> {
        let file = SnapshotFileRef {
            version: SNAPSHOT_VERSION,
            saved_at: now_ms,
            rooms: rooms.iter().filter(|r| self.keep(r, now_ms)).collect(),
        };
        let written = file.rooms.len();
        let bytes = serde_json::to_vec(&file).map_err(SnapshotError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), rooms = written, "snapshot written");
        Ok(written)
    }

    /// Like [`try_save`](Self::try_save), but failures are logged and
    /// swallowed. Persistence is advisory while the process is alive.
    pub async fn save(&self, rooms: &[RoomSnapshot], now_ms: u64) -> usize {
        match self.try_save(rooms, now_ms).await {
            Ok(written) => written,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot write failed");
                0
            }
        }
    }

    /// Reads the snapshot file.
    ///
    /// A missing file yields an empty list. Individual rooms that fail to
    /// parse are skipped; terminal and stale rooms are dropped.
    ///
    /// # Errors
    /// Returns `SnapshotError::Io` if the file exists but cannot be read,
    /// or `SnapshotError::Corrupt` if it is not a snapshot document.
    pub async fn try_load(&self, now_ms: u64) -> Result<Vec<RoomSnapshot>, SnapshotError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let document: SnapshotDocument =
            serde_json::from_slice(&bytes).map_err(SnapshotError::Corrupt)?;
        let (version, raw) = document.into_rooms();
        if version > SNAPSHOT_VERSION {
            warn!(version, "snapshot written by a newer release, reading known fields only");
        }

        let mut rooms = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<RoomSnapshot>(value) {
                Ok(room) if self.keep(&room, now_ms) => rooms.push(room),
                Ok(room) => debug!(code = %room.code, "skipping terminal or stale snapshot room"),
                Err(e) => warn!(error = %e, "skipping unreadable snapshot room"),
            }
        }
        Ok(rooms)
    }

    /// Like [`try_load`](Self::try_load), but any error yields an empty
    /// list.
    pub async fn load(&self, now_ms: u64) -> Vec<RoomSnapshot> {
        match self.try_load(now_ms).await {
            Ok(rooms) => {
                info!(path = %self.path.display(), rooms = rooms.len(), "snapshot loaded");
                rooms
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot unusable, starting empty");
                Vec::new()
            }
        }
    }
}
