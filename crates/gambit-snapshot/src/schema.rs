//! On-disk snapshot schema.
//!
//! The file is one JSON document:
//!
//! ```text
//! { "version": 1, "savedAt": 1718000000000, "rooms": [ { "code": "ABC234", ... } ] }
//! ```
//!
//! Readers and writers may come from different releases, so every field
//! except `code` has a default and unknown fields are ignored. A bare
//! array of rooms (no envelope) is accepted as well.

use gambit_protocol::{Color, Identity, Outcome, RoomCode, TimeControl};
use serde::{Deserialize, Serialize};

/// Format version written by this release.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A seat owner as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatRecord {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub guest: bool,
}

impl From<&Identity> for SeatRecord {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            guest: identity.guest,
        }
    }
}

impl From<SeatRecord> for Identity {
    fn from(record: SeatRecord) -> Self {
        let display_name = if record.display_name.is_empty() {
            record.id.clone()
        } else {
            record.display_name
        };
        Identity {
            id: record.id,
            display_name,
            guest: record.guest,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRecords {
    #[serde(default)]
    pub white: Option<SeatRecord>,
    #[serde(default)]
    pub black: Option<SeatRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingTimes {
    pub white_ms: u64,
    pub black_ms: u64,
}

/// The persisted projection of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: RoomCode,
    #[serde(default)]
    pub match_id: String,
    #[serde(default)]
    pub seats: SeatRecords,
    /// Raw position (FEN). Only used when the move log cannot be replayed.
    #[serde(default)]
    pub board_serialization: String,
    #[serde(default)]
    pub move_log: Vec<String>,
    #[serde(default)]
    pub turn: Option<Color>,
    #[serde(default)]
    pub is_terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub time_control: Option<TimeControl>,
    #[serde(default)]
    pub remaining_times: Option<RemainingTimes>,
    /// Unix milliseconds.
    #[serde(default)]
    pub created_at: u64,
    /// Unix milliseconds.
    #[serde(default)]
    pub last_activity: u64,
}

impl RoomSnapshot {
    /// Whether the room was active within `retention_ms` of `now_ms`.
    pub fn is_fresh(&self, now_ms: u64, retention_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity) <= retention_ms
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SnapshotFileRef<'a> {
    pub version: u32,
    pub saved_at: u64,
    pub rooms: Vec<&'a RoomSnapshot>,
}

/// Rooms are kept as raw values so one bad entry does not discard the
/// rest of the file.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum SnapshotDocument {
    Versioned(VersionedFile),
    Bare(Vec<serde_json::Value>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionedFile {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub rooms: Vec<serde_json::Value>,
}

impl SnapshotDocument {
    pub(crate) fn into_rooms(self) -> (u32, Vec<serde_json::Value>) {
        match self {
            Self::Versioned(file) => (file.version, file.rooms),
            Self::Bare(rooms) => (0, rooms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_snapshot_tolerates_missing_and_unknown_fields() {
        let json = r#"{"code":"abc234","somethingNew":{"x":1}}"#;
        let room: RoomSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(room.code, RoomCode::new("ABC234"));
        assert!(room.move_log.is_empty());
        assert!(!room.is_terminal);
        assert!(room.remaining_times.is_none());
    }

    #[test]
    fn test_seat_record_without_name_falls_back_to_id() {
        let record: SeatRecord = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        let identity = Identity::from(record);
        assert_eq!(identity.display_name, "u1");
    }

    #[test]
    fn test_is_fresh_respects_retention() {
        let room: RoomSnapshot =
            serde_json::from_str(r#"{"code":"A","lastActivity":1000}"#).unwrap();
        assert!(room.is_fresh(2_000, 1_000));
        assert!(!room.is_fresh(2_001, 1_000));
    }

    #[test]
    fn test_document_accepts_bare_array() {
        let doc: SnapshotDocument = serde_json::from_str(r#"[{"code":"A"}]"#).unwrap();
        let (version, rooms) = doc.into_rooms();
        assert_eq!(version, 0);
        assert_eq!(rooms.len(), 1);
    }
}
