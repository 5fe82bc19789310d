//! Game vocabulary shared by the wire format, the room state machine, and
//! the snapshot schema.
//!
//! Everything here is plain data with serde derives. JSON field names are
//! camelCase because the client application is a browser app.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Color / seat
// ---------------------------------------------------------------------------

/// One of the two playing seats. Also the side to move.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Both seats in assignment order: white is filled before black.
    pub const ALL: [Color; 2] = [Color::White, Color::Black];

    /// Returns the other seat.
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// The short, human-typable code peers use to address a room.
///
/// Codes are case-insensitive on input: construction trims whitespace and
/// upper-cases, so `" ab3k9x"` and `"AB3K9X"` name the same room. The
/// normalisation also runs when a code is deserialized off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Creates a normalised room code.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A verified (or synthetic guest) player identity.
///
/// Seats are owned by identities, not connections: the same identity
/// coming back on a fresh connection reclaims its seat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable id issued by the auth service (or `guest-…`).
    pub id: String,
    /// Name shown to the opponent and spectators.
    pub display_name: String,
    /// `true` for identities minted while the auth service was degraded.
    /// Guests never receive stats updates.
    #[serde(default)]
    pub guest: bool,
}

impl Identity {
    /// Creates a regular (non-guest) identity.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            guest: false,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Time control and clocks
// ---------------------------------------------------------------------------

/// Fischer time control: `initial` seconds per side, plus `increment`
/// seconds added after every move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    /// Starting time per side, in seconds.
    pub initial: u64,
    /// Seconds added to the mover's clock after each accepted move.
    #[serde(default)]
    pub increment: u64,
}

impl TimeControl {
    /// Longest starting time accepted, in seconds (one day).
    pub const MAX_INITIAL: u64 = 86_400;
    /// Largest increment accepted, in seconds (one hour).
    pub const MAX_INCREMENT: u64 = 3_600;

    /// Whether a client may open a room with this control. The starting
    /// time must be non-zero and both values within the maximums.
    pub fn is_valid(&self) -> bool {
        (1..=Self::MAX_INITIAL).contains(&self.initial) && self.increment <= Self::MAX_INCREMENT
    }

    pub fn initial_duration(&self) -> Duration {
        Duration::from_secs(self.initial)
    }

    pub fn increment_duration(&self) -> Duration {
        Duration::from_secs(self.increment)
    }
}

/// Remaining time on both clocks, in milliseconds.
///
/// `running` is the side whose clock is ticking. Its value is computed
/// live at the moment the view is built, so peers can extrapolate from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockView {
    pub white_ms: u64,
    pub black_ms: u64,
    pub running: Option<Color>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Who won a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    White,
    Black,
    Draw,
}

/// Why a game finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    Resignation,
    Agreement,
    Timeout,
    Repetition,
    InsufficientMaterial,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::Resignation => "resignation",
            Self::Agreement => "agreement",
            Self::Timeout => "timeout",
            Self::Repetition => "repetition",
            Self::InsufficientMaterial => "insufficient-material",
        };
        f.write_str(s)
    }
}

/// The terminal state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub result: GameResult,
    pub reason: EndReason,
}

impl Outcome {
    /// `winner` won the game for the given reason.
    pub fn win(winner: Color, reason: EndReason) -> Self {
        let result = match winner {
            Color::White => GameResult::White,
            Color::Black => GameResult::Black,
        };
        Self { result, reason }
    }

    /// The game was drawn for the given reason.
    pub fn draw(reason: EndReason) -> Self {
        Self {
            result: GameResult::Draw,
            reason,
        }
    }

    /// Returns the winning seat, or `None` for a draw.
    pub fn winner(&self) -> Option<Color> {
        match self.result {
            GameResult::White => Some(Color::White),
            GameResult::Black => Some(Color::Black),
            GameResult::Draw => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

/// A move as submitted by a peer: origin and destination squares in
/// algebraic coordinates, plus an optional promotion piece letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<char>,
}

impl MoveRequest {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            promotion: None,
        }
    }

    /// Parses coordinate notation such as `e2e4` or `e7e8q`.
    ///
    /// This is the notation stored in move logs, so a log can be replayed
    /// by turning every entry back into a `MoveRequest`.
    pub fn from_notation(notation: &str) -> Option<Self> {
        let notation = notation.trim();
        if !notation.is_ascii() || !(4..=5).contains(&notation.len()) {
            return None;
        }
        Some(Self {
            from: notation[0..2].to_string(),
            to: notation[2..4].to_string(),
            promotion: notation[4..].chars().next(),
        })
    }

    /// Formats the move in coordinate notation.
    pub fn notation(&self) -> String {
        match self.promotion {
            Some(p) => format!("{}{}{}", self.from, self.to, p),
            None => format!("{}{}", self.from, self.to),
        }
    }
}

// ---------------------------------------------------------------------------
// Room views
// ---------------------------------------------------------------------------

/// Lifecycle state of a room.
///
/// ```text
/// Waiting ──(second seat filled)──→ Active ──(settlement)──→ Terminal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Fewer than two seats are filled.
    Waiting,
    /// Both seats are filled and moves are accepted.
    Active,
    /// The game has an outcome. Nothing mutates any more.
    Terminal,
}

impl RoomStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Active => write!(f, "Active"),
            Self::Terminal => write!(f, "Terminal"),
        }
    }
}

/// A seat owner as other peers see them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub display_name: String,
    /// Whether the owner currently has a live connection to the room.
    pub connected: bool,
}

/// Both seats of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatsView {
    pub white: Option<PlayerView>,
    pub black: Option<PlayerView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_opposite() {
        assert_eq!(Color::White.opposite(), Color::Black);
        assert_eq!(Color::Black.opposite(), Color::White);
    }

    #[test]
    fn test_color_serializes_lowercase() {
        let json = serde_json::to_string(&Color::Black).unwrap();
        assert_eq!(json, "\"black\"");
    }

    #[test]
    fn test_room_code_normalises_case_and_whitespace() {
        assert_eq!(RoomCode::new(" ab3k9x ").as_str(), "AB3K9X");
    }

    #[test]
    fn test_room_code_deserializes_normalised() {
        let code: RoomCode = serde_json::from_str("\"qw7rty\"").unwrap();
        assert_eq!(code, RoomCode::new("QW7RTY"));
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"QW7RTY\"");
    }

    #[test]
    fn test_identity_guest_defaults_to_false() {
        let id: Identity =
            serde_json::from_str(r#"{"id":"u1","displayName":"Ann"}"#)
                .unwrap();
        assert!(!id.guest);
    }

    #[test]
    fn test_end_reason_is_kebab_case() {
        let json =
            serde_json::to_string(&EndReason::InsufficientMaterial).unwrap();
        assert_eq!(json, "\"insufficient-material\"");
        assert_eq!(
            EndReason::InsufficientMaterial.to_string(),
            "insufficient-material"
        );
    }

    #[test]
    fn test_outcome_winner() {
        assert_eq!(
            Outcome::win(Color::Black, EndReason::Timeout).winner(),
            Some(Color::Black)
        );
        assert_eq!(Outcome::draw(EndReason::Agreement).winner(), None);
    }

    #[test]
    fn test_move_request_from_notation_with_promotion() {
        let mv = MoveRequest::from_notation("e7e8q").unwrap();
        assert_eq!(mv.from, "e7");
        assert_eq!(mv.to, "e8");
        assert_eq!(mv.promotion, Some('q'));
        assert_eq!(mv.notation(), "e7e8q");
    }

    #[test]
    fn test_move_request_from_notation_rejects_garbage() {
        assert!(MoveRequest::from_notation("e2").is_none());
        assert!(MoveRequest::from_notation("e2e4e5").is_none());
        assert!(MoveRequest::from_notation("é2e4").is_none());
    }

    #[test]
    fn test_time_control_increment_defaults_to_zero() {
        let tc: TimeControl = serde_json::from_str(r#"{"initial":60}"#).unwrap();
        assert_eq!(tc.increment, 0);
        assert_eq!(tc.initial_duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_time_control_is_valid_bounds() {
        let tc = |initial, increment| TimeControl { initial, increment };
        assert!(tc(1, 0).is_valid());
        assert!(tc(TimeControl::MAX_INITIAL, TimeControl::MAX_INCREMENT).is_valid());
        assert!(!tc(0, 5).is_valid());
        assert!(!tc(TimeControl::MAX_INITIAL + 1, 0).is_valid());
        assert!(!tc(300, TimeControl::MAX_INCREMENT + 1).is_valid());
        assert!(!tc(u64::MAX, u64::MAX).is_valid());
    }
}
