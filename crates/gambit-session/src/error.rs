//! Error types for the session layer.

use std::time::Duration;

use gambit_protocol::{RoomCode, TimeControl, codes};
use gambit_room::RoomError;

/// Why a token could not be turned into an identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The credential itself is bad. The connection is rejected.
    #[error("invalid token")]
    InvalidToken,

    /// The auth service could not be reached or is misconfigured. Not the
    /// player's fault, so they are admitted as a guest.
    #[error("auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Failures of the relational store. Absorbed by the
/// [`Mirror`](crate::Mirror); never shown to a player.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown match {0}")]
    UnknownMatch(String),
}

/// Errors returned to the peer that caused them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// An event arrived on a connection that has no identity yet.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// No room with this code in memory or in the store. Rooms are never
    /// created implicitly by a join.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// The connection is not in a room (or not in the room it named).
    #[error("you are not in a room")]
    NotInRoom,

    /// The requested clock is zero or longer than the server allows.
    #[error("time control out of range: {}+{}", .0.initial, .0.increment)]
    InvalidTimeControl(TimeControl),

    /// Every generated room code collided.
    #[error("could not allocate a room code")]
    CodeSpaceExhausted,

    #[error(transparent)]
    Room(#[from] RoomError),
}

impl SessionError {
    /// The error code sent to the peer.
    pub fn code(&self) -> u16 {
        match self {
            Self::AuthFailed(_) | Self::NotAuthenticated => codes::UNAUTHORIZED,
            Self::AlreadyAuthenticated | Self::NotInRoom | Self::InvalidTimeControl(_) => {
                codes::BAD_REQUEST
            }
            Self::RoomNotFound(_) => codes::NOT_FOUND,
            Self::CodeSpaceExhausted => codes::UNAVAILABLE,
            Self::Room(e) => e.code(),
        }
    }
}
