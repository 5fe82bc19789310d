//! Error types for the room layer.

use gambit_protocol::{Color, codes};

/// Reasons a room refuses a peer action.
///
/// A rejected action never changes the room.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The connection does not own a seat in this room.
    #[error("you are not seated in this room")]
    NotSeated,

    /// The acting seat is not the side to move.
    #[error("not your turn: {turn} to move")]
    WrongTurn { seat: Color, turn: Color },

    /// The rules engine rejected the move.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The room is still waiting for its second player.
    #[error("game has not started")]
    NotStarted,

    /// The room already has an outcome.
    #[error("game is over")]
    GameOver,

    #[error("no draw offer to answer")]
    NoDrawOffer,

    #[error("draw already offered")]
    DrawAlreadyOffered,

    #[error("cannot answer your own draw offer")]
    OwnDrawOffer,

    /// The requested seat is owned by someone else.
    #[error("{0} seat is taken")]
    SeatTaken(Color),
}

impl RoomError {
    /// The error code sent to the peer.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotSeated | Self::OwnDrawOffer => codes::FORBIDDEN,
            Self::IllegalMove(_) => codes::BAD_REQUEST,
            Self::WrongTurn { .. }
            | Self::NotStarted
            | Self::GameOver
            | Self::NoDrawOffer
            | Self::DrawAlreadyOffered
            | Self::SeatTaken(_) => codes::CONFLICT,
        }
    }
}
