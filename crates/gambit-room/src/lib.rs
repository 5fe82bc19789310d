//! Room state for gambit.
//!
//! A [`Room`] is one match: two seats, spectators, a board, a clock, and
//! a draw offer. It is a plain value owned by the session layer. Nothing
//! here spawns tasks or touches the network.
//!
//! # Key types
//!
//! - [`RulesEngine`]: move legality and terminal classification
//! - [`ChessRules`]: the standard chess engine
//! - [`Room`]: the `Waiting → Active → Terminal` state machine
//! - [`GameClock`]: per-seat clocks with increment
//! - [`RoomError`]: why an action was refused

mod chess_rules;
mod clock;
mod error;
mod room;
mod rules;

pub use chess_rules::{ChessPosition, ChessRules};
pub use clock::GameClock;
pub use error::RoomError;
pub use room::{
    Departure, DrawOffer, DrawResponse, Joined, MoveApplied, PlayerRef, RestoredRoom, Room,
};
pub use rules::{MoveVerdict, RulesEngine};
