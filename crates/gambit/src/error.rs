//! Unified error type for the gambit server.

use gambit_protocol::ProtocolError;
use gambit_room::RoomError;
use gambit_session::SessionError;
use gambit_snapshot::SnapshotError;
use gambit_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GambitError {
    /// Connection, send, or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed frame or unexpected event.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Admission or routing failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The session actor has stopped.
    #[error("session actor is not running")]
    ActorStopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_protocol::{Color, RoomCode};

    #[test]
    fn test_from_transport_error_wraps() {
        let err: GambitError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, GambitError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error_wraps() {
        let err: GambitError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, GambitError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error_keeps_message() {
        let err: GambitError = SessionError::RoomNotFound(RoomCode::new("ABC234")).into();
        assert!(matches!(err, GambitError::Session(_)));
        assert!(err.to_string().contains("ABC234"));
    }

    #[test]
    fn test_from_room_error_wraps() {
        let err: GambitError = RoomError::SeatTaken(Color::White).into();
        assert!(matches!(err, GambitError::Room(_)));
    }
}
