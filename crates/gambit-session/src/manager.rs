//! The session manager: the room registry and everything that touches it.
//!
//! `SessionManager` owns two tables that must agree with each other:
//!
//! - `rooms`: room code → [`Room`], the only copy of each match
//! - `index`: connection → room code, derived from room membership
//!
//! Both are private and only change inside the methods below, always
//! together. The manager is a plain struct with synchronous methods. It
//! is owned by a single task, which feeds it one event at a time, so no
//! mutation is ever interleaved with another.
//!
//! Every method mutates first, then sends events to peers, then queues
//! mirror writes. Nothing here awaits.
//!
//! ```text
//! create_room ──→ [Waiting] ──join_room──→ [Active] ──settle──→ [Terminal]
//!                                              │                     │
//!                          make_move / resign / draws                ▼
//!                          sweep_clocks (timeout)          remove_expired()
//! ```

use std::collections::HashMap;
use std::time::Duration;

use gambit_protocol::{
    ClientEvent, Color, ConnectionId, Identity, MoveRequest, Outcome, PlayerView, RoomCode,
    ServerEvent, TimeControl,
};
use gambit_room::{
    Departure, DrawOffer, DrawResponse, MoveVerdict, RestoredRoom, Room, RulesEngine,
};
use gambit_snapshot::{RemainingTimes, RoomSnapshot, SeatRecord, SeatRecords};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ids;
use crate::{Mirror, SessionConfig, SessionError, StatResult, StoreWrite, StoredMatch};

/// Where a peer's outbound events go.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

struct Peer {
    identity: Identity,
    outbox: Outbox,
}

/// What [`SessionManager::join_room`] managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAttempt {
    /// The connection is in the room, on a seat or as a spectator.
    Joined(Option<Color>),
    /// The code is not in memory. The caller should ask the store and
    /// finish with [`SessionManager::restore_from_store`].
    NeedsLookup,
}

/// What the caller must do after [`SessionManager::handle_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Done,
    /// Look `code` up in the store on behalf of the connection.
    Lookup(RoomCode),
}

/// Why a connection is leaving a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Left,
    Disconnected,
}

pub struct SessionManager<E: RulesEngine> {
    engine: E,
    config: SessionConfig,
    rooms: HashMap<RoomCode, Room<E::Board>>,
    index: HashMap<ConnectionId, RoomCode>,
    peers: HashMap<ConnectionId, Peer>,
    mirror: Mirror,
    snapshot_requested: bool,
}

impl<E: RulesEngine> SessionManager<E> {
    pub fn new(engine: E, config: SessionConfig, mirror: Mirror) -> Self {
        Self {
            engine,
            config,
            rooms: HashMap::new(),
            index: HashMap::new(),
            peers: HashMap::new(),
            mirror,
            snapshot_requested: false,
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn room(&self, code: &RoomCode) -> Option<&Room<E::Board>> {
        self.rooms.get(code)
    }

    /// The room `conn` is currently in.
    pub fn room_of(&self, conn: ConnectionId) -> Option<&RoomCode> {
        self.index.get(&conn)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn identity(&self, conn: ConnectionId) -> Option<&Identity> {
        self.peers.get(&conn).map(|p| &p.identity)
    }

    /// Whether the most recent datastore call succeeded.
    pub fn persistence_available(&self) -> bool {
        self.mirror.is_available()
    }

    /// Returns `true` once after an event that should be snapshotted
    /// right away (room creation, explicit leave).
    pub fn take_snapshot_request(&mut self) -> bool {
        std::mem::take(&mut self.snapshot_requested)
    }

    // ---------------------------------------------------------------------
    // Outbound
    // ---------------------------------------------------------------------

    fn send(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(peer) = self.peers.get(&conn) {
            // A closed outbox means the connection task is gone; its
            // disconnect is already on the way.
            let _ = peer.outbox.send(event);
        }
    }

    fn broadcast_except(&self, code: &RoomCode, except: Option<ConnectionId>, event: &ServerEvent) {
        let Some(room) = self.rooms.get(code) else {
            return;
        };
        for conn in room.members() {
            if Some(conn) != except {
                self.send(conn, event.clone());
            }
        }
    }

    fn broadcast(&self, code: &RoomCode, event: &ServerEvent) {
        self.broadcast_except(code, None, event);
    }

    fn reject(&self, conn: ConnectionId, event: &str, err: &SessionError) {
        debug!(%conn, event, error = %err, "event rejected");
        self.send(conn, ServerEvent::error(err.code(), err.to_string()));
    }

    fn room_state(&self, room: &Room<E::Board>, seat: Option<Color>, now: Instant) -> ServerEvent {
        ServerEvent::RoomJoined {
            code: room.code().clone(),
            assigned_seat: seat,
            state: room.status(),
            players: room.players(),
            time_control: room.time_control(),
            clocks: room.clocks(&self.engine, now),
            board: self.engine.serialize(room.board()),
            moves: room.moves().to_vec(),
            turn: self.engine.turn(room.board()),
        }
    }

    // ---------------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------------

    /// Registers an authenticated connection.
    pub fn attach(&mut self, conn: ConnectionId, identity: Identity, outbox: Outbox) {
        debug!(%conn, identity = %identity, "peer attached");
        self.peers.insert(conn, Peer { identity, outbox });
    }

    fn identity_of(&self, conn: ConnectionId) -> Result<Identity, SessionError> {
        self.peers
            .get(&conn)
            .map(|p| p.identity.clone())
            .ok_or(SessionError::NotAuthenticated)
    }

    /// The room `conn` is in, healing the index if it points at a room
    /// that is gone or no longer lists the connection.
    fn resolve(&mut self, conn: ConnectionId) -> Result<RoomCode, SessionError> {
        let code = self.index.get(&conn).cloned().ok_or(SessionError::NotInRoom)?;
        match self.rooms.get(&code) {
            Some(room) if room.is_member(conn) => Ok(code),
            _ => {
                warn!(%conn, %code, "connection index out of sync with registry, clearing entry");
                self.index.remove(&conn);
                Err(SessionError::NotInRoom)
            }
        }
    }

    fn depart(&mut self, conn: ConnectionId, exit: Exit) -> Option<(RoomCode, Departure)> {
        let code = self.index.remove(&conn)?;
        let departure = self.rooms.get_mut(&code)?.detach(conn)?;
        let event = match exit {
            Exit::Left => ServerEvent::PlayerLeft {
                seat: departure.seat,
                player: departure.player.clone(),
            },
            Exit::Disconnected => ServerEvent::PlayerDisconnected {
                seat: departure.seat,
                player: departure.player.clone(),
            },
        };
        self.broadcast(&code, &event);
        debug!(%conn, %code, ?exit, seat = ?departure.seat, "left room");
        Some((code, departure))
    }

    /// Removes the connection from its current room, if any.
    fn leave_current(&mut self, conn: ConnectionId) {
        self.depart(conn, Exit::Left);
    }

    /// The connection closed. Any seat it drove stays owned and the game
    /// goes on; the owner may come back on a new connection.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.depart(conn, Exit::Disconnected);
        if self.peers.remove(&conn).is_some() {
            debug!(%conn, "peer detached");
        }
    }

    // ---------------------------------------------------------------------
    // Rooms
    // ---------------------------------------------------------------------

    fn allocate_code(&self) -> Result<RoomCode, SessionError> {
        for attempt in 1..=self.config.max_code_attempts {
            let code = ids::room_code(&self.config.code_alphabet, self.config.code_length)
                .ok_or(SessionError::CodeSpaceExhausted)?;
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
            debug!(%code, attempt, "room code collision");
        }
        warn!(
            attempts = self.config.max_code_attempts,
            "gave up allocating a room code"
        );
        Err(SessionError::CodeSpaceExhausted)
    }

    /// Opens a new room and seats `conn` on a random color.
    ///
    /// The creator receives `roomCreated` then `roomJoined`. The match
    /// record is mirrored afterwards and a snapshot is requested.
    ///
    /// # Errors
    /// [`SessionError::NotAuthenticated`],
    /// [`SessionError::InvalidTimeControl`] or
    /// [`SessionError::CodeSpaceExhausted`].
    pub fn create_room(
        &mut self,
        conn: ConnectionId,
        time_control: Option<TimeControl>,
        now: Instant,
        now_ms: u64,
    ) -> Result<RoomCode, SessionError> {
        let identity = self.identity_of(conn)?;
        if let Some(tc) = time_control.filter(|tc| !tc.is_valid()) {
            return Err(SessionError::InvalidTimeControl(tc));
        }
        let code = self.allocate_code()?;
        self.leave_current(conn);

        let seat = if rand::rng().random_bool(0.5) {
            Color::White
        } else {
            Color::Black
        };
        let time_control = time_control.or(self.config.default_time_control);
        let match_id = ids::match_id();
        let mut room = Room::new(
            code.clone(),
            match_id.clone(),
            self.engine.initial_board(),
            time_control,
            now_ms,
            now,
        );
        room.claim_seat(seat, identity.clone(), conn, now)?;
        self.rooms.insert(code.clone(), room);
        self.index.insert(conn, code.clone());
        info!(%code, %conn, identity = %identity, %seat, "room created");

        self.send(
            conn,
            ServerEvent::RoomCreated {
                code: code.clone(),
                share_link: format!("{}{}", self.config.share_link_base, code),
            },
        );
        if let Some(room) = self.rooms.get(&code) {
            self.send(conn, self.room_state(room, Some(seat), now));
        }

        self.mirror.write(StoreWrite::CreateMatch {
            match_id: match_id.clone(),
            code: code.clone(),
            time_control,
            created_at_ms: now_ms,
        });
        self.mirror.write(StoreWrite::SeatPlayer {
            match_id,
            seat,
            identity,
        });
        self.snapshot_requested = true;
        Ok(code)
    }

    /// Puts `conn` into a resident room. The room must exist.
    fn enter(
        &mut self,
        conn: ConnectionId,
        identity: &Identity,
        code: &RoomCode,
        now: Instant,
    ) -> Result<Option<Color>, SessionError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| SessionError::RoomNotFound(code.clone()))?;

        let displaced = room
            .seat_of_identity(&identity.id)
            .and_then(|color| room.seat(color))
            .and_then(|player| player.live)
            .filter(|&old| old != conn);
        let joined = room.join(identity, conn, now);
        let match_id = room.match_id().to_string();

        if let Some(old) = displaced {
            // The owner came back on a new connection before the old one
            // was noticed as closed.
            self.index.remove(&old);
        }
        self.index.insert(conn, code.clone());
        info!(
            %code,
            %conn,
            identity = %identity,
            seat = ?joined.seat,
            reconnected = joined.reconnected,
            "joined room"
        );

        let Some(room) = self.rooms.get(code) else {
            return Err(SessionError::RoomNotFound(code.clone()));
        };
        self.send(conn, self.room_state(room, joined.seat, now));
        let player = joined
            .seat
            .and_then(|color| room.seat(color))
            .map(|p| p.view())
            .unwrap_or_else(|| PlayerView {
                id: identity.id.clone(),
                display_name: identity.display_name.clone(),
                connected: true,
            });
        self.broadcast_except(
            code,
            Some(conn),
            &ServerEvent::PlayerJoined {
                seat: joined.seat,
                player,
            },
        );
        if joined.started {
            let players = room.players();
            if let (Some(white), Some(black)) = (players.white, players.black) {
                self.broadcast(code, &ServerEvent::GameStarted { white, black });
            }
        }

        if let Some(seat) = joined.seat.filter(|_| !joined.reconnected) {
            self.mirror.write(StoreWrite::SeatPlayer {
                match_id,
                seat,
                identity: identity.clone(),
            });
        }
        Ok(joined.seat)
    }

    /// Enters the room `code`.
    ///
    /// A returning seat owner is rebound to their seat; otherwise the
    /// first free seat is taken (white first), otherwise the connection
    /// spectates. Filling the second seat broadcasts `gameStarted` once.
    ///
    /// Returns [`JoinAttempt::NeedsLookup`] if the code is not in memory.
    /// Rooms are never created by a join.
    pub fn join_room(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
        now: Instant,
    ) -> Result<JoinAttempt, SessionError> {
        let identity = self.identity_of(conn)?;
        if !self.rooms.contains_key(code) {
            return Ok(JoinAttempt::NeedsLookup);
        }
        if self.index.get(&conn) != Some(code) {
            self.leave_current(conn);
        }
        self.enter(conn, &identity, code, now).map(JoinAttempt::Joined)
    }

    /// Completes a join after the store lookup for `code` returned.
    ///
    /// # Errors
    /// [`SessionError::RoomNotFound`] if the store had nothing (or was
    /// unreachable) and the room has not appeared in memory meanwhile.
    pub fn restore_from_store(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
        stored: Option<StoredMatch>,
        now: Instant,
    ) -> Result<Option<Color>, SessionError> {
        if !self.rooms.contains_key(code) {
            let stored = stored.ok_or_else(|| SessionError::RoomNotFound(code.clone()))?;
            let room = self
                .rebuild_stored(stored, now)
                .ok_or_else(|| SessionError::RoomNotFound(code.clone()))?;
            info!(%code, status = %room.status(), "room reconstructed from store");
            self.rooms.insert(code.clone(), room);
        }
        // The peer may have gone away while the lookup was in flight.
        let identity = self.identity_of(conn)?;
        if self.index.get(&conn) != Some(code) {
            self.leave_current(conn);
        }
        self.enter(conn, &identity, code, now)
    }

    /// Replays `moves` from the initial position, falling back to the
    /// serialized board if any move fails to replay.
    fn rebuild_board(&self, moves: &[String], serialized: &str) -> Option<E::Board> {
        let replayed = moves.iter().try_fold(self.engine.initial_board(), |board, notation| {
            let mv = MoveRequest::from_notation(notation)?;
            match self.engine.apply(&board, &mv) {
                MoveVerdict::Applied { board, .. } => Some(board),
                MoveVerdict::Rejected { .. } => None,
            }
        });
        replayed.or_else(|| {
            warn!(moves = moves.len(), "move log does not replay, using stored position");
            self.engine.parse(serialized)
        })
    }

    fn rebuild_stored(&self, stored: StoredMatch, now: Instant) -> Option<Room<E::Board>> {
        let board = self.rebuild_board(&stored.moves, &stored.board)?;
        let remaining = stored.clocks.map(|c| {
            (
                Duration::from_millis(c.white_ms),
                Duration::from_millis(c.black_ms),
            )
        });
        Some(Room::restore(
            RestoredRoom {
                code: stored.code,
                match_id: stored.match_id,
                white: stored.white,
                black: stored.black,
                board,
                moves: stored.moves,
                time_control: stored.time_control,
                remaining,
                outcome: stored.outcome,
                created_at_ms: stored.created_at_ms,
                idle: Duration::ZERO,
            },
            now,
        ))
    }

    /// Leaves the room `code`. The seat stays owned.
    ///
    /// # Errors
    /// [`SessionError::NotInRoom`] if `conn` is not in that room.
    pub fn leave_room(&mut self, conn: ConnectionId, code: &RoomCode) -> Result<(), SessionError> {
        let current = self.resolve(conn)?;
        if current != *code {
            return Err(SessionError::NotInRoom);
        }
        self.depart(conn, Exit::Left);
        self.snapshot_requested = true;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Gameplay
    // ---------------------------------------------------------------------

    /// Plays a move for the seat `conn` drives.
    ///
    /// Rejections (not seated, wrong turn, illegal move, game not running)
    /// go to the actor only and change nothing. An accepted move is
    /// broadcast with fresh clocks, mirrored, and settles the room if it
    /// ended the game.
    pub fn make_move(
        &mut self,
        conn: ConnectionId,
        mv: &MoveRequest,
        now: Instant,
    ) -> Result<(), SessionError> {
        let code = self.resolve(conn)?;
        let room = self
            .rooms
            .get_mut(&code)
            .ok_or_else(|| SessionError::RoomNotFound(code.clone()))?;
        let applied = room.try_move(&self.engine, conn, mv, now)?;
        let ply = room.moves().len();
        let match_id = room.match_id().to_string();
        debug!(%code, %conn, mv = %applied.notation, ply, "move accepted");

        self.broadcast(
            &code,
            &ServerEvent::MoveMade {
                mv: applied.notation.clone(),
                board: applied.board.clone(),
                turn: applied.turn,
                clocks: applied.clocks,
            },
        );
        self.mirror.write(StoreWrite::AppendMove {
            match_id,
            ply,
            notation: applied.notation,
            board: applied.board,
            clocks: applied.clocks,
        });
        if let Some(outcome) = applied.outcome {
            self.settle(&code, outcome, now);
        }
        Ok(())
    }

    fn acting_room(&mut self, conn: ConnectionId) -> Result<(RoomCode, &mut Room<E::Board>), SessionError> {
        let code = self.resolve(conn)?;
        let room = self
            .rooms
            .get_mut(&code)
            .ok_or_else(|| SessionError::RoomNotFound(code.clone()))?;
        Ok((code, room))
    }

    pub fn resign(&mut self, conn: ConnectionId, now: Instant) -> Result<(), SessionError> {
        let (code, room) = self.acting_room(conn)?;
        let outcome = room.resign(conn, now)?;
        self.settle(&code, outcome, now);
        Ok(())
    }

    /// Offers a draw. If the opponent already has an offer pending, the
    /// offers cross and the game is drawn by agreement.
    pub fn offer_draw(&mut self, conn: ConnectionId, now: Instant) -> Result<(), SessionError> {
        let (code, room) = self.acting_room(conn)?;
        match room.offer_draw(conn, now)? {
            DrawOffer::Offered(by) => self.broadcast(&code, &ServerEvent::DrawOffered { by }),
            DrawOffer::Agreed(outcome) => {
                self.settle(&code, outcome, now);
            }
        }
        Ok(())
    }

    /// Accepts or declines the pending offer. Only the seat that did not
    /// make the offer may answer it.
    pub fn respond_to_draw(
        &mut self,
        conn: ConnectionId,
        accept: bool,
        now: Instant,
    ) -> Result<(), SessionError> {
        let (code, room) = self.acting_room(conn)?;
        match room.respond_to_draw(conn, accept, now)? {
            DrawResponse::Accepted(outcome) => {
                self.settle(&code, outcome, now);
            }
            DrawResponse::Declined(by) => {
                self.broadcast(&code, &ServerEvent::DrawDeclined { by });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Settlement
    // ---------------------------------------------------------------------

    /// Ends the game in room `code`. The single path to `Terminal`.
    ///
    /// Broadcasts `gameEnded` once, then mirrors the result and one stats
    /// update per non-guest seat. The stats writes do not depend on the
    /// result write succeeding. Returns `false` if the room was already
    /// settled or does not exist.
    pub fn settle(&mut self, code: &RoomCode, outcome: Outcome, now: Instant) -> bool {
        let Some(room) = self.rooms.get_mut(code) else {
            return false;
        };
        if !room.settle(&self.engine, outcome, now) {
            return false;
        }
        let room = &*room;
        let final_notation = self.engine.serialize(room.board());
        let clocks = room.clocks(&self.engine, now);
        let match_id = room.match_id().to_string();
        let seats: Vec<(Color, Identity)> = Color::ALL
            .into_iter()
            .filter_map(|c| room.seat(c).map(|p| (c, p.identity.clone())))
            .collect();

        self.broadcast(
            code,
            &ServerEvent::GameEnded {
                outcome: outcome.result,
                reason: outcome.reason,
                final_notation: final_notation.clone(),
                clocks,
            },
        );
        self.mirror.write(StoreWrite::FinishMatch {
            match_id,
            outcome,
            final_board: final_notation,
        });
        for (seat, identity) in seats.into_iter().filter(|(_, i)| !i.guest) {
            self.mirror.write(StoreWrite::UpdateStats {
                identity_id: identity.id,
                result: StatResult::for_seat(&outcome, seat),
            });
        }
        true
    }

    /// Settles every active timed room whose side to move has run out.
    /// Elapsed time is recomputed from each turn timestamp; stored clock
    /// values are not touched. Returns how many rooms were settled.
    pub fn sweep_clocks(&mut self, now: Instant) -> usize {
        let flagged: Vec<(RoomCode, Outcome)> = self
            .rooms
            .iter()
            .filter_map(|(code, room)| {
                room.check_timeout(&self.engine, now)
                    .map(|outcome| (code.clone(), outcome))
            })
            .collect();
        flagged
            .into_iter()
            .filter(|(code, outcome)| self.settle(code, *outcome, now))
            .count()
    }

    /// Drops finished rooms past their grace period, and unfinished rooms
    /// with no seat owner online that have been idle past
    /// `abandon_after`. Nobody is told; no result is recorded for
    /// abandoned rooms.
    pub fn remove_expired(&mut self, now: Instant) -> Vec<RoomCode> {
        let grace = self.config.terminal_grace;
        let abandon = self.config.abandon_after;
        let expired: Vec<RoomCode> = self
            .rooms
            .iter()
            .filter(|(_, room)| match room.ended_at() {
                Some(ended) => now.saturating_duration_since(ended) >= grace,
                None => {
                    room.seats_offline()
                        && now.saturating_duration_since(room.last_activity()) >= abandon
                }
            })
            .map(|(code, _)| code.clone())
            .collect();

        for code in &expired {
            if let Some(room) = self.rooms.remove(code) {
                info!(%code, status = %room.status(), "room removed");
            }
        }
        if !expired.is_empty() {
            self.index.retain(|_, code| !expired.contains(code));
        }
        expired
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    /// Projects every room for persistence. The snapshot store decides
    /// which rooms to keep.
    pub fn snapshot(&self, now: Instant, now_ms: u64) -> Vec<RoomSnapshot> {
        self.rooms
            .values()
            .map(|room| {
                let idle = now.saturating_duration_since(room.last_activity());
                let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
                let record = |color| room.seat(color).map(|p| SeatRecord::from(&p.identity));
                RoomSnapshot {
                    code: room.code().clone(),
                    match_id: room.match_id().to_string(),
                    seats: SeatRecords {
                        white: record(Color::White),
                        black: record(Color::Black),
                    },
                    board_serialization: self.engine.serialize(room.board()),
                    move_log: room.moves().to_vec(),
                    turn: Some(self.engine.turn(room.board())),
                    is_terminal: room.status().is_terminal(),
                    outcome: room.outcome(),
                    time_control: room.time_control(),
                    remaining_times: room.remaining(&self.engine, now).map(|(white, black)| {
                        RemainingTimes {
                            white_ms: u64::try_from(white.as_millis()).unwrap_or(u64::MAX),
                            black_ms: u64::try_from(black.as_millis()).unwrap_or(u64::MAX),
                        }
                    }),
                    created_at: room.created_at_ms(),
                    last_activity: now_ms.saturating_sub(idle_ms),
                }
            })
            .collect()
    }

    /// Rebuilds rooms from a snapshot at process start. Terminal entries,
    /// codes already resident, and boards that neither replay nor parse
    /// are skipped. `now_ms` is wall-clock time, used to carry each room's
    /// idle time across the restart. Returns how many rooms were restored.
    pub fn restore(&mut self, snapshots: Vec<RoomSnapshot>, now: Instant, now_ms: u64) -> usize {
        let mut restored = 0;
        for snap in snapshots {
            if snap.is_terminal || snap.outcome.is_some() || self.rooms.contains_key(&snap.code) {
                continue;
            }
            let Some(board) = self.rebuild_board(&snap.move_log, &snap.board_serialization)
            else {
                warn!(code = %snap.code, "snapshot room has no usable board, skipping");
                continue;
            };
            if let Some(turn) = snap.turn.filter(|&t| t != self.engine.turn(&board)) {
                debug!(code = %snap.code, %turn, "snapshot turn disagrees with board, using board");
            }
            let remaining = snap.remaining_times.map(|r| {
                (
                    Duration::from_millis(r.white_ms),
                    Duration::from_millis(r.black_ms),
                )
            });
            let match_id = if snap.match_id.is_empty() {
                ids::match_id()
            } else {
                snap.match_id
            };
            let room = Room::restore(
                RestoredRoom {
                    code: snap.code.clone(),
                    match_id,
                    white: snap.seats.white.map(Identity::from),
                    black: snap.seats.black.map(Identity::from),
                    board,
                    moves: snap.move_log,
                    time_control: snap.time_control,
                    remaining,
                    outcome: None,
                    created_at_ms: snap.created_at,
                    idle: Duration::from_millis(now_ms.saturating_sub(snap.last_activity)),
                },
                now,
            );
            self.rooms.insert(snap.code, room);
            restored += 1;
        }
        if restored > 0 {
            info!(rooms = restored, "rooms restored from snapshot");
        }
        restored
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    /// Routes one inbound event. Rejections are answered with an `error`
    /// event to `conn` only.
    pub fn handle_event(
        &mut self,
        conn: ConnectionId,
        event: ClientEvent,
        now: Instant,
        now_ms: u64,
    ) -> Dispatch {
        let name = event.name();
        let result = match event {
            ClientEvent::Authenticate { .. } => Err(SessionError::AlreadyAuthenticated),
            ClientEvent::CreateRoom { time_control } => self
                .create_room(conn, time_control, now, now_ms)
                .map(|_| Dispatch::Done),
            ClientEvent::JoinRoom { code } => {
                self.join_room(conn, &code, now).map(|attempt| match attempt {
                    JoinAttempt::Joined(_) => Dispatch::Done,
                    JoinAttempt::NeedsLookup => Dispatch::Lookup(code),
                })
            }
            ClientEvent::MakeMove(mv) => self.make_move(conn, &mv, now).map(|_| Dispatch::Done),
            ClientEvent::Resign => self.resign(conn, now).map(|_| Dispatch::Done),
            ClientEvent::OfferDraw => self.offer_draw(conn, now).map(|_| Dispatch::Done),
            ClientEvent::AcceptDraw => self
                .respond_to_draw(conn, true, now)
                .map(|_| Dispatch::Done),
            ClientEvent::DeclineDraw => self
                .respond_to_draw(conn, false, now)
                .map(|_| Dispatch::Done),
            ClientEvent::LeaveRoom { code } => {
                self.leave_room(conn, &code).map(|_| Dispatch::Done)
            }
            ClientEvent::Ping { client_time } => {
                self.send(
                    conn,
                    ServerEvent::Pong {
                        client_time,
                        server_time: now_ms,
                    },
                );
                Ok(Dispatch::Done)
            }
        };
        result.unwrap_or_else(|e| {
            self.reject(conn, name, &e);
            Dispatch::Done
        })
    }

    /// Finishes a [`Dispatch::Lookup`], answering the peer on failure.
    pub fn finish_lookup(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
        stored: Option<StoredMatch>,
        now: Instant,
    ) {
        if let Err(e) = self.restore_from_store(conn, code, stored, now) {
            self.reject(conn, "joinRoom", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_room::ChessRules;

    fn manager() -> SessionManager<ChessRules> {
        let (mirror, _rx) = Mirror::detached();
        SessionManager::new(ChessRules, SessionConfig::default(), mirror)
    }

    #[test]
    fn test_allocate_code_single_char_space_exhausts() {
        let (mirror, _rx) = Mirror::detached();
        let config = SessionConfig {
            code_alphabet: "A".into(),
            code_length: 1,
            max_code_attempts: 4,
            ..SessionConfig::default()
        };
        let mut mgr = SessionManager::new(ChessRules, config, mirror);
        let (tx, _out) = mpsc::unbounded_channel();
        mgr.attach(ConnectionId::new(1), Identity::new("a", "A"), tx);
        let now = Instant::now();
        mgr.create_room(ConnectionId::new(1), None, now, 0).unwrap();

        let (tx, _out2) = mpsc::unbounded_channel();
        mgr.attach(ConnectionId::new(2), Identity::new("b", "B"), tx);
        let err = mgr
            .create_room(ConnectionId::new(2), None, now, 0)
            .unwrap_err();
        assert_eq!(err, SessionError::CodeSpaceExhausted);
        assert_eq!(mgr.room_count(), 1);
    }

    #[test]
    fn test_resolve_heals_index_pointing_at_missing_room() {
        let mut mgr = manager();
        let conn = ConnectionId::new(5);
        mgr.index.insert(conn, RoomCode::new("GHOST2"));
        assert_eq!(mgr.resolve(conn), Err(SessionError::NotInRoom));
        assert!(mgr.room_of(conn).is_none());
    }

    #[test]
    fn test_take_snapshot_request_resets() {
        let mut mgr = manager();
        assert!(!mgr.take_snapshot_request());
        mgr.snapshot_requested = true;
        assert!(mgr.take_snapshot_request());
        assert!(!mgr.take_snapshot_request());
    }
}
