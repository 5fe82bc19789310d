//! The durable match log.
//!
//! A [`MatchStore`] is an append-only record of matches, moves, results,
//! and player statistics. The session never depends on it for gameplay:
//! writes are mirrored after the fact by the [`Mirror`](crate::Mirror),
//! and the only read is a cold-start lookup for a room code that is not
//! in memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gambit_protocol::{ClockView, Color, Identity, Outcome, RoomCode, TimeControl};

use crate::StoreError;

/// Win/loss/draw from one player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatResult {
    Win,
    Loss,
    Draw,
}

impl StatResult {
    /// The result of `outcome` for the player on `seat`.
    pub fn for_seat(outcome: &Outcome, seat: Color) -> Self {
        match outcome.winner() {
            None => Self::Draw,
            Some(winner) if winner == seat => Self::Win,
            Some(_) => Self::Loss,
        }
    }
}

/// One append to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    CreateMatch {
        match_id: String,
        code: RoomCode,
        time_control: Option<TimeControl>,
        created_at_ms: u64,
    },
    SeatPlayer {
        match_id: String,
        seat: Color,
        identity: Identity,
    },
    AppendMove {
        match_id: String,
        /// 1-based half-move number.
        ply: usize,
        notation: String,
        board: String,
        clocks: Option<ClockView>,
    },
    FinishMatch {
        match_id: String,
        outcome: Outcome,
        final_board: String,
    },
    UpdateStats {
        identity_id: String,
        result: StatResult,
    },
}

impl StoreWrite {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateMatch { .. } => "create_match",
            Self::SeatPlayer { .. } => "seat_player",
            Self::AppendMove { .. } => "append_move",
            Self::FinishMatch { .. } => "finish_match",
            Self::UpdateStats { .. } => "update_stats",
        }
    }
}

/// A match as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMatch {
    pub match_id: String,
    pub code: RoomCode,
    pub white: Option<Identity>,
    pub black: Option<Identity>,
    pub time_control: Option<TimeControl>,
    pub moves: Vec<String>,
    /// Last known position, used if the move log does not replay.
    pub board: String,
    /// Last recorded clocks.
    pub clocks: Option<ClockView>,
    pub outcome: Option<Outcome>,
    pub created_at_ms: u64,
}

/// Durable match storage.
pub trait MatchStore: Send + Sync + 'static {
    /// Applies one write.
    fn write(
        &self,
        op: StoreWrite,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Looks up the most recent match with this room code.
    fn load_match(
        &self,
        code: &RoomCode,
    ) -> impl std::future::Future<Output = Result<Option<StoredMatch>, StoreError>> + Send;
}

/// Per-identity totals kept by [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

#[derive(Debug)]
struct MemoryState {
    available: bool,
    matches: HashMap<String, StoredMatch>,
    by_code: HashMap<RoomCode, String>,
    stats: HashMap<String, PlayerStats>,
    writes: usize,
}

/// An in-process [`MatchStore`].
///
/// Cloning shares the same data. [`set_available`](Self::set_available)
/// simulates an outage: every call fails until it is switched back on.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                available: true,
                matches: HashMap::new(),
                by_code: HashMap::new(),
                stats: HashMap::new(),
                writes: 0,
            })),
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MemoryState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        if !state.available {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        f(&mut state)
    }

    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.available = available;
        }
    }

    /// Stats for one identity (zeros if never recorded).
    pub fn stats(&self, identity_id: &str) -> PlayerStats {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.stats.get(identity_id).copied())
            .unwrap_or_default()
    }

    /// The stored match for a code, bypassing availability.
    pub fn get(&self, code: &RoomCode) -> Option<StoredMatch> {
        let state = self.state.lock().ok()?;
        let id = state.by_code.get(code)?;
        state.matches.get(id).cloned()
    }

    /// Inserts a match directly, as if written by an earlier process.
    pub fn insert(&self, stored: StoredMatch) {
        if let Ok(mut state) = self.state.lock() {
            state
                .by_code
                .insert(stored.code.clone(), stored.match_id.clone());
            state.matches.insert(stored.match_id.clone(), stored);
        }
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.state.lock().map(|s| s.writes).unwrap_or_default()
    }
}

fn apply(state: &mut MemoryState, op: StoreWrite) -> Result<(), StoreError> {
    let known = |state: &mut MemoryState, id: &str| {
        state
            .matches
            .contains_key(id)
            .then_some(())
            .ok_or_else(|| StoreError::UnknownMatch(id.to_string()))
    };
    match op {
        StoreWrite::CreateMatch {
            match_id,
            code,
            time_control,
            created_at_ms,
        } => {
            state.by_code.insert(code.clone(), match_id.clone());
            state.matches.insert(
                match_id.clone(),
                StoredMatch {
                    match_id,
                    code,
                    white: None,
                    black: None,
                    time_control,
                    moves: Vec::new(),
                    board: String::new(),
                    clocks: None,
                    outcome: None,
                    created_at_ms,
                },
            );
        }
        StoreWrite::SeatPlayer {
            match_id,
            seat,
            identity,
        } => {
            known(state, &match_id)?;
            if let Some(m) = state.matches.get_mut(&match_id) {
                match seat {
                    Color::White => m.white = Some(identity),
                    Color::Black => m.black = Some(identity),
                }
            }
        }
        StoreWrite::AppendMove {
            match_id,
            notation,
            board,
            clocks,
            ..
        } => {
            known(state, &match_id)?;
            if let Some(m) = state.matches.get_mut(&match_id) {
                m.moves.push(notation);
                m.board = board;
                m.clocks = clocks;
            }
        }
        StoreWrite::FinishMatch {
            match_id,
            outcome,
            final_board,
        } => {
            known(state, &match_id)?;
            if let Some(m) = state.matches.get_mut(&match_id) {
                m.outcome = Some(outcome);
                m.board = final_board;
            }
        }
        StoreWrite::UpdateStats {
            identity_id,
            result,
        } => {
            let stats = state.stats.entry(identity_id).or_default();
            match result {
                StatResult::Win => stats.wins += 1,
                StatResult::Loss => stats.losses += 1,
                StatResult::Draw => stats.draws += 1,
            }
        }
    }
    state.writes += 1;
    Ok(())
}

impl MatchStore for MemoryStore {
    async fn write(&self, op: StoreWrite) -> Result<(), StoreError> {
        self.with_state(|state| apply(state, op))
    }

    async fn load_match(&self, code: &RoomCode) -> Result<Option<StoredMatch>, StoreError> {
        self.with_state(|state| {
            Ok(state
                .by_code
                .get(code)
                .and_then(|id| state.matches.get(id))
                .cloned())
        })
    }
}
