//! The `RulesEngine` trait: the seam to move legality and terminal-state
//! classification.
//!
//! A room never interprets the board itself. It hands the board and a
//! move to the engine and stores whatever comes back; the side to move is
//! always read from the engine, so the room cannot drift out of sync with
//! the position.

use gambit_protocol::{Color, MoveRequest, Outcome};

/// Result of asking the engine to play a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveVerdict<B> {
    /// The move was legal.
    Applied {
        /// Position after the move.
        board: B,
        /// Side to move in the new position.
        turn: Color,
        /// Canonical notation for the move log (replayable through
        /// [`MoveRequest::from_notation`]).
        notation: String,
    },
    /// The move was illegal in this position.
    Rejected { reason: String },
}

/// Move legality and terminal-state classification for one game type.
///
/// Boards are immutable values: [`apply`](Self::apply) returns a new board
/// and leaves the input untouched, so a rejected move can never leave a
/// room half-mutated.
pub trait RulesEngine: Send + Sync + 'static {
    /// Opaque position type owned by the engine.
    type Board: Clone + Send + Sync + 'static;

    /// The starting position.
    fn initial_board(&self) -> Self::Board;

    /// Plays `mv` on `board`.
    fn apply(&self, board: &Self::Board, mv: &MoveRequest) -> MoveVerdict<Self::Board>;

    /// Side to move.
    fn turn(&self, board: &Self::Board) -> Color;

    /// Returns the outcome if the position is terminal (checkmate,
    /// stalemate, repetition, insufficient material).
    fn classify(&self, board: &Self::Board) -> Option<Outcome>;

    /// Serializes the position (FEN for chess).
    fn serialize(&self, board: &Self::Board) -> String;

    /// Parses a serialized position. Position-only: history that the
    /// serialization does not carry (e.g. repetition counts) starts fresh.
    fn parse(&self, serialized: &str) -> Option<Self::Board>;
}
