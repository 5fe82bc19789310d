//! The per-match state machine.
//!
//! A [`Room`] owns the seats, spectators, board, move log, clock, and draw
//! offer of one match. It never performs I/O and never blocks: every
//! method runs to completion and reports what changed, and the session
//! layer decides who hears about it.
//!
//! Rejections are checked before anything is touched, so a method that
//! returns `Err` leaves the room exactly as it found it.

use std::collections::HashMap;
use std::time::Duration;

use gambit_protocol::{
    ClockView, Color, ConnectionId, EndReason, Identity, MoveRequest, Outcome,
    PlayerView, RoomCode, RoomStatus, SeatsView, TimeControl,
};
use tokio::time::Instant;

use crate::{GameClock, MoveVerdict, RoomError, RulesEngine};

/// A seat owner.
///
/// Ownership belongs to the identity. `live` is only the connection the
/// owner is currently using; losing it leaves the seat owned.
#[derive(Debug, Clone)]
pub struct PlayerRef {
    pub identity: Identity,
    pub live: Option<ConnectionId>,
}

impl PlayerRef {
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.identity.id.clone(),
            display_name: self.identity.display_name.clone(),
            connected: self.live.is_some(),
        }
    }
}

/// What [`Room::join`] did with a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    /// The seat the connection now drives, `None` for a spectator.
    pub seat: Option<Color>,
    /// The identity already owned `seat` and was only rebound.
    pub reconnected: bool,
    /// This join filled the second seat and started the game.
    pub started: bool,
}

/// Who went away in [`Room::detach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub seat: Option<Color>,
    pub player: PlayerView,
}

/// Result of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveApplied {
    pub notation: String,
    pub board: String,
    pub turn: Color,
    pub clocks: Option<ClockView>,
    /// Set when the move ended the game (mate, draw rule, or a flag).
    /// The room is not settled yet; the caller settles it after
    /// broadcasting the move.
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOffer {
    /// The offer is now pending.
    Offered(Color),
    /// The opponent had an offer pending, so the offers cross into an
    /// agreed draw.
    Agreed(Outcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawResponse {
    Accepted(Outcome),
    Declined(Color),
}

/// Everything needed to rebuild a room after a restart.
#[derive(Debug, Clone)]
pub struct RestoredRoom<B> {
    pub code: RoomCode,
    pub match_id: String,
    pub white: Option<Identity>,
    pub black: Option<Identity>,
    pub board: B,
    pub moves: Vec<String>,
    pub time_control: Option<TimeControl>,
    /// Remaining (white, black). Falls back to the full initial time.
    pub remaining: Option<(Duration, Duration)>,
    pub outcome: Option<Outcome>,
    pub created_at_ms: u64,
    /// How long the room had been idle when it was persisted.
    pub idle: Duration,
}

/// One match.
#[derive(Debug)]
pub struct Room<B> {
    code: RoomCode,
    match_id: String,
    white: Option<PlayerRef>,
    black: Option<PlayerRef>,
    spectators: HashMap<ConnectionId, Identity>,
    board: B,
    moves: Vec<String>,
    time_control: Option<TimeControl>,
    clock: Option<GameClock>,
    draw_offer: Option<Color>,
    status: RoomStatus,
    outcome: Option<Outcome>,
    created_at_ms: u64,
    last_activity: Instant,
    ended_at: Option<Instant>,
    start_announced: bool,
}

impl<B> Room<B> {
    /// Creates an empty room in `Waiting`.
    pub fn new(
        code: RoomCode,
        match_id: impl Into<String>,
        board: B,
        time_control: Option<TimeControl>,
        created_at_ms: u64,
        now: Instant,
    ) -> Self {
        Self {
            code,
            match_id: match_id.into(),
            white: None,
            black: None,
            spectators: HashMap::new(),
            board,
            moves: Vec::new(),
            clock: time_control.as_ref().map(GameClock::new),
            time_control,
            draw_offer: None,
            status: RoomStatus::Waiting,
            outcome: None,
            created_at_ms,
            last_activity: now,
            ended_at: None,
            start_announced: false,
        }
    }

    /// Rebuilds a room from persisted state. Nobody is connected; a room
    /// with both seats owned resumes `Active` with its clock restarted at
    /// `now`, and is treated as already announced. Idle time carries over,
    /// so retention and abandonment keep counting from the last real
    /// activity.
    pub fn restore(parts: RestoredRoom<B>, now: Instant) -> Self {
        let clock = parts.time_control.as_ref().map(|tc| match parts.remaining {
            Some((white, black)) => {
                GameClock::with_remaining(white, black, tc.increment_duration())
            }
            None => GameClock::new(tc),
        });
        let seat = |identity: Option<Identity>| {
            identity.map(|identity| PlayerRef {
                identity,
                live: None,
            })
        };
        let mut room = Self {
            code: parts.code,
            match_id: parts.match_id,
            white: seat(parts.white),
            black: seat(parts.black),
            spectators: HashMap::new(),
            board: parts.board,
            moves: parts.moves,
            time_control: parts.time_control,
            clock,
            draw_offer: None,
            status: RoomStatus::Waiting,
            outcome: None,
            created_at_ms: parts.created_at_ms,
            last_activity: now.checked_sub(parts.idle).unwrap_or(now),
            ended_at: None,
            start_announced: false,
        };
        if let Some(outcome) = parts.outcome {
            room.status = RoomStatus::Terminal;
            room.outcome = Some(outcome);
            room.ended_at = Some(now);
        } else if room.white.is_some() && room.black.is_some() {
            room.status = RoomStatus::Active;
            room.start_announced = true;
            if let Some(clock) = room.clock.as_mut() {
                clock.start(now);
            }
        }
        room
    }

    // -- accessors --------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn time_control(&self) -> Option<TimeControl> {
        self.time_control
    }

    pub fn draw_offer(&self) -> Option<Color> {
        self.draw_offer
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    pub fn seat(&self, color: Color) -> Option<&PlayerRef> {
        match color {
            Color::White => self.white.as_ref(),
            Color::Black => self.black.as_ref(),
        }
    }

    fn seat_mut(&mut self, color: Color) -> &mut Option<PlayerRef> {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn players(&self) -> SeatsView {
        SeatsView {
            white: self.white.as_ref().map(PlayerRef::view),
            black: self.black.as_ref().map(PlayerRef::view),
        }
    }

    /// The seat owned by `identity_id`, if any.
    pub fn seat_of_identity(&self, identity_id: &str) -> Option<Color> {
        Color::ALL
            .into_iter()
            .find(|&c| self.seat(c).is_some_and(|p| p.identity.id == identity_id))
    }

    /// The seat currently driven by `conn`, if any.
    pub fn seat_of_connection(&self, conn: ConnectionId) -> Option<Color> {
        Color::ALL
            .into_iter()
            .find(|&c| self.seat(c).is_some_and(|p| p.live == Some(conn)))
    }

    pub fn is_member(&self, conn: ConnectionId) -> bool {
        self.seat_of_connection(conn).is_some() || self.spectators.contains_key(&conn)
    }

    /// Every live connection in the room: seat owners first, then
    /// spectators.
    pub fn members(&self) -> Vec<ConnectionId> {
        let seats = Color::ALL
            .into_iter()
            .filter_map(|c| self.seat(c).and_then(|p| p.live));
        seats.chain(self.spectators.keys().copied()).collect()
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// `true` if neither seat owner is connected.
    pub fn seats_offline(&self) -> bool {
        Color::ALL
            .into_iter()
            .all(|c| self.seat(c).is_none_or(|p| p.live.is_none()))
    }

    /// `true` once the `gameStarted` notice has gone out for this room.
    pub fn start_announced(&self) -> bool {
        self.start_announced
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    // -- membership -------------------------------------------------------

    /// Seats the room's creator on `color`.
    pub fn claim_seat(
        &mut self,
        color: Color,
        identity: Identity,
        conn: ConnectionId,
        now: Instant,
    ) -> Result<(), RoomError> {
        if self.seat(color).is_some() {
            return Err(RoomError::SeatTaken(color));
        }
        *self.seat_mut(color) = Some(PlayerRef {
            identity,
            live: Some(conn),
        });
        self.touch(now);
        Ok(())
    }

    /// Adds a connection to the room.
    ///
    /// Resolution order: an identity that already owns a seat is rebound
    /// to it; otherwise the first empty seat (white before black) is taken
    /// while the game is not over; otherwise the connection spectates.
    /// Filling the second seat moves the room to `Active` and starts the
    /// clock.
    pub fn join(&mut self, identity: &Identity, conn: ConnectionId, now: Instant) -> Joined {
        self.touch(now);
        self.spectators.remove(&conn);

        if let Some(color) = self.seat_of_identity(&identity.id) {
            if let Some(player) = self.seat_mut(color).as_mut() {
                player.live = Some(conn);
            }
            return Joined {
                seat: Some(color),
                reconnected: true,
                started: false,
            };
        }

        if !self.status.is_terminal() {
            if let Some(color) = Color::ALL.into_iter().find(|&c| self.seat(c).is_none()) {
                self.spectators.retain(|_, spectator| spectator.id != identity.id);
                *self.seat_mut(color) = Some(PlayerRef {
                    identity: identity.clone(),
                    live: Some(conn),
                });
                let started = self.maybe_start(now);
                return Joined {
                    seat: Some(color),
                    reconnected: false,
                    started,
                };
            }
        }

        self.spectators
            .retain(|_, spectator| spectator.id != identity.id);
        self.spectators.insert(conn, identity.clone());
        Joined {
            seat: None,
            reconnected: false,
            started: false,
        }
    }

    fn maybe_start(&mut self, now: Instant) -> bool {
        if self.status != RoomStatus::Waiting || self.white.is_none() || self.black.is_none() {
            return false;
        }
        self.status = RoomStatus::Active;
        self.start_announced = true;
        if let Some(clock) = self.clock.as_mut() {
            clock.start(now);
        }
        tracing::info!(code = %self.code, "game started");
        true
    }

    /// Drops `conn` from the room. A seat owner keeps the seat with no live
    /// connection; a spectator is removed. Returns `None` if `conn` was not
    /// a member.
    pub fn detach(&mut self, conn: ConnectionId) -> Option<Departure> {
        if let Some(color) = self.seat_of_connection(conn) {
            let player = self.seat_mut(color).as_mut()?;
            player.live = None;
            return Some(Departure {
                seat: Some(color),
                player: player.view(),
            });
        }
        self.spectators.remove(&conn).map(|identity| Departure {
            seat: None,
            player: PlayerView {
                id: identity.id,
                display_name: identity.display_name,
                connected: false,
            },
        })
    }

    // -- game actions -----------------------------------------------------

    fn acting_seat(&self, conn: ConnectionId) -> Result<Color, RoomError> {
        let seat = self.seat_of_connection(conn).ok_or(RoomError::NotSeated)?;
        match self.status {
            RoomStatus::Waiting => Err(RoomError::NotStarted),
            RoomStatus::Terminal => Err(RoomError::GameOver),
            RoomStatus::Active => Ok(seat),
        }
    }

    /// Plays a move for the seat driven by `conn`.
    ///
    /// On success the mover's clock is charged (elapsed time minus
    /// increment), any pending draw offer is cleared, and the result
    /// carries an outcome if the move ended the game.
    pub fn try_move<E>(
        &mut self,
        engine: &E,
        conn: ConnectionId,
        mv: &MoveRequest,
        now: Instant,
    ) -> Result<MoveApplied, RoomError>
    where
        E: RulesEngine<Board = B>,
    {
        let seat = self.acting_seat(conn)?;
        let turn = engine.turn(&self.board);
        if seat != turn {
            return Err(RoomError::WrongTurn { seat, turn });
        }
        let (board, turn, notation) = match engine.apply(&self.board, mv) {
            MoveVerdict::Applied {
                board,
                turn,
                notation,
            } => (board, turn, notation),
            MoveVerdict::Rejected { reason } => return Err(RoomError::IllegalMove(reason)),
        };

        self.board = board;
        self.moves.push(notation.clone());
        self.draw_offer = None;
        self.touch(now);
        let flagged = self
            .clock
            .as_mut()
            .is_some_and(|clock| clock.charge(seat, now));

        let outcome = if flagged {
            Some(Outcome::win(seat.opposite(), EndReason::Timeout))
        } else {
            engine.classify(&self.board).or_else(|| {
                self.clock
                    .as_ref()
                    .and_then(|clock| clock.exhausted(turn, now))
                    .map(|loser| Outcome::win(loser.opposite(), EndReason::Timeout))
            })
        };

        Ok(MoveApplied {
            notation,
            board: engine.serialize(&self.board),
            turn,
            clocks: self.clock_view(Some(turn), now),
            outcome,
        })
    }

    /// Returns the outcome of `conn`'s seat resigning. The caller settles.
    pub fn resign(&mut self, conn: ConnectionId, now: Instant) -> Result<Outcome, RoomError> {
        let seat = self.acting_seat(conn)?;
        self.touch(now);
        Ok(Outcome::win(seat.opposite(), EndReason::Resignation))
    }

    pub fn offer_draw(&mut self, conn: ConnectionId, now: Instant) -> Result<DrawOffer, RoomError> {
        let seat = self.acting_seat(conn)?;
        match self.draw_offer {
            Some(by) if by == seat => Err(RoomError::DrawAlreadyOffered),
            Some(_) => {
                self.touch(now);
                Ok(DrawOffer::Agreed(Outcome::draw(EndReason::Agreement)))
            }
            None => {
                self.draw_offer = Some(seat);
                self.touch(now);
                Ok(DrawOffer::Offered(seat))
            }
        }
    }

    /// Accepts or declines the opponent's pending offer.
    pub fn respond_to_draw(
        &mut self,
        conn: ConnectionId,
        accept: bool,
        now: Instant,
    ) -> Result<DrawResponse, RoomError> {
        let seat = self.acting_seat(conn)?;
        match self.draw_offer {
            None => Err(RoomError::NoDrawOffer),
            Some(by) if by == seat => Err(RoomError::OwnDrawOffer),
            Some(_) if accept => {
                self.touch(now);
                Ok(DrawResponse::Accepted(Outcome::draw(EndReason::Agreement)))
            }
            Some(_) => {
                self.draw_offer = None;
                self.touch(now);
                Ok(DrawResponse::Declined(seat))
            }
        }
    }

    // -- clocks and settlement --------------------------------------------

    /// Recomputes the side to move's clock from its turn timestamp.
    /// Returns the timeout outcome if a clock is exhausted. Never changes
    /// the stored counters.
    pub fn check_timeout<E>(&self, engine: &E, now: Instant) -> Option<Outcome>
    where
        E: RulesEngine<Board = B>,
    {
        if !self.status.is_active() {
            return None;
        }
        let clock = self.clock.as_ref()?;
        clock
            .exhausted(engine.turn(&self.board), now)
            .map(|loser| Outcome::win(loser.opposite(), EndReason::Timeout))
    }

    /// Ends the game. Returns `false` (and changes nothing) if the room is
    /// already terminal, so an outcome is applied at most once.
    pub fn settle<E>(&mut self, engine: &E, outcome: Outcome, now: Instant) -> bool
    where
        E: RulesEngine<Board = B>,
    {
        if self.status.is_terminal() {
            return false;
        }
        let running = engine.turn(&self.board);
        if let Some(clock) = self.clock.as_mut() {
            clock.stop(running, now);
        }
        self.status = RoomStatus::Terminal;
        self.outcome = Some(outcome);
        self.draw_offer = None;
        self.ended_at = Some(now);
        self.touch(now);
        tracing::info!(
            code = %self.code,
            result = ?outcome.result,
            reason = %outcome.reason,
            "game settled"
        );
        true
    }

    fn clock_view(&self, running: Option<Color>, now: Instant) -> Option<ClockView> {
        let running = running.filter(|_| self.status.is_active());
        self.clock.as_ref().map(|clock| clock.view(running, now))
    }

    /// Clock view with the side to move's time computed live.
    pub fn clocks<E>(&self, engine: &E, now: Instant) -> Option<ClockView>
    where
        E: RulesEngine<Board = B>,
    {
        self.clock_view(Some(engine.turn(&self.board)), now)
    }

    /// Remaining (white, black) as of `now`, for persistence.
    pub fn remaining<E>(&self, engine: &E, now: Instant) -> Option<(Duration, Duration)>
    where
        E: RulesEngine<Board = B>,
    {
        let clock = self.clock.as_ref()?;
        if !self.status.is_active() {
            return Some((clock.stored(Color::White), clock.stored(Color::Black)));
        }
        let turn = engine.turn(&self.board);
        Some((
            clock.remaining(Color::White, turn, now),
            clock.remaining(Color::Black, turn, now),
        ))
    }
}
