//! Events exchanged over a peer connection.
//!
//! Both directions use adjacently tagged JSON:
//!
//! ```text
//! { "event": "makeMove", "data": { "from": "e2", "to": "e4" } }
//! { "event": "resign" }
//! ```
//!
//! Unit variants carry no `data` key at all.

use serde::{Deserialize, Serialize};

use crate::types::{
    ClockView, Color, EndReason, GameResult, Identity, MoveRequest,
    PlayerView, RoomCode, RoomStatus, SeatsView, TimeControl,
};

/// HTTP-style codes carried by [`ServerEvent::Error`].
pub mod codes {
    /// Malformed event or illegal move.
    pub const BAD_REQUEST: u16 = 400;
    /// Missing or rejected credentials.
    pub const UNAUTHORIZED: u16 = 401;
    /// The connection does not own the seat the action needs.
    pub const FORBIDDEN: u16 = 403;
    /// Unknown room code.
    pub const NOT_FOUND: u16 = 404;
    /// Valid request that conflicts with the room's current state
    /// (wrong turn, game over, draw already pending, ...).
    pub const CONFLICT: u16 = 409;
    /// The server could not complete the request right now.
    pub const UNAVAILABLE: u16 = 503;
}

/// Peer → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Must be the first event on a connection.
    Authenticate { token: String },
    /// Open a new room; the creator is seated at random.
    CreateRoom {
        #[serde(default)]
        time_control: Option<TimeControl>,
    },
    /// Enter a room by code as a seat owner, returning owner, or spectator.
    JoinRoom { code: RoomCode },
    MakeMove(MoveRequest),
    Resign,
    OfferDraw,
    AcceptDraw,
    DeclineDraw,
    LeaveRoom { code: RoomCode },
    /// Keep-alive; answered with [`ServerEvent::Pong`].
    Ping { client_time: u64 },
}

impl ClientEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::CreateRoom { .. } => "createRoom",
            Self::JoinRoom { .. } => "joinRoom",
            Self::MakeMove(_) => "makeMove",
            Self::Resign => "resign",
            Self::OfferDraw => "offerDraw",
            Self::AcceptDraw => "acceptDraw",
            Self::DeclineDraw => "declineDraw",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::Ping { .. } => "ping",
        }
    }
}

/// Server → peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Authenticated {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<Identity>,
    },
    RoomCreated {
        code: RoomCode,
        share_link: String,
    },
    /// Full room state, sent only to the peer that joined.
    RoomJoined {
        code: RoomCode,
        /// `None` for spectators.
        assigned_seat: Option<Color>,
        state: RoomStatus,
        players: SeatsView,
        time_control: Option<TimeControl>,
        clocks: Option<ClockView>,
        board: String,
        moves: Vec<String>,
        turn: Color,
    },
    PlayerJoined {
        seat: Option<Color>,
        player: PlayerView,
    },
    PlayerLeft {
        seat: Option<Color>,
        player: PlayerView,
    },
    PlayerDisconnected {
        seat: Option<Color>,
        player: PlayerView,
    },
    GameStarted {
        white: PlayerView,
        black: PlayerView,
    },
    MoveMade {
        #[serde(rename = "move")]
        mv: String,
        board: String,
        turn: Color,
        clocks: Option<ClockView>,
    },
    DrawOffered { by: Color },
    DrawDeclined { by: Color },
    GameEnded {
        outcome: GameResult,
        reason: EndReason,
        final_notation: String,
        clocks: Option<ClockView>,
    },
    Error { message: String, code: u16 },
    Pong { client_time: u64, server_time: u64 },
}

impl ServerEvent {
    /// Builds an [`ServerEvent::Error`].
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code,
        }
    }
}
