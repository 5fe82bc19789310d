//! Room state machine tests against the real chess engine.

use std::time::Duration;

use gambit_protocol::{
    Color, ConnectionId, EndReason, GameResult, Identity, MoveRequest, Outcome, RoomCode,
    RoomStatus, TimeControl,
};
use gambit_room::{
    ChessRules, DrawOffer, DrawResponse, RestoredRoom, Room, RoomError, RulesEngine,
};
use tokio::time::{Instant, advance};

type ChessRoom = Room<<ChessRules as RulesEngine>::Board>;

fn alice() -> Identity {
    Identity::new("u-alice", "Alice")
}

fn bob() -> Identity {
    Identity::new("u-bob", "Bob")
}

fn carol() -> Identity {
    Identity::new("u-carol", "Carol")
}

fn conn(n: u64) -> ConnectionId {
    ConnectionId::new(n)
}

fn room(time_control: Option<TimeControl>) -> ChessRoom {
    Room::new(
        RoomCode::new("ABC234"),
        "match-1",
        ChessRules.initial_board(),
        time_control,
        0,
        Instant::now(),
    )
}

fn blitz() -> Option<TimeControl> {
    Some(TimeControl {
        initial: 300,
        increment: 5,
    })
}

/// Alice on white (conn 1), Bob on black (conn 2), game active.
fn active_room(time_control: Option<TimeControl>) -> ChessRoom {
    let mut room = room(time_control);
    room.join(&alice(), conn(1), Instant::now());
    let joined = room.join(&bob(), conn(2), Instant::now());
    assert!(joined.started);
    room
}

fn mv(notation: &str) -> MoveRequest {
    MoveRequest::from_notation(notation).unwrap()
}

// =========================================================================
// Seats
// =========================================================================

#[test]
fn test_join_fills_white_then_black_then_spectates() {
    let mut room = room(None);
    let now = Instant::now();

    let a = room.join(&alice(), conn(1), now);
    assert_eq!(a.seat, Some(Color::White));
    assert!(!a.started);
    assert_eq!(room.status(), RoomStatus::Waiting);

    let b = room.join(&bob(), conn(2), now);
    assert_eq!(b.seat, Some(Color::Black));
    assert!(b.started);
    assert_eq!(room.status(), RoomStatus::Active);

    let c = room.join(&carol(), conn(3), now);
    assert_eq!(c.seat, None);
    assert_eq!(room.spectator_count(), 1);
}

#[test]
fn test_join_same_identity_twice_rebinds_single_seat() {
    let mut room = room(None);
    let now = Instant::now();
    room.join(&alice(), conn(1), now);
    let again = room.join(&alice(), conn(9), now);

    assert_eq!(again.seat, Some(Color::White));
    assert!(again.reconnected);
    assert!(room.seat(Color::Black).is_none());
    assert_eq!(room.seat_of_connection(conn(9)), Some(Color::White));
    assert_eq!(room.seat_of_connection(conn(1)), None);
}

#[test]
fn test_claim_seat_occupied_returns_seat_taken() {
    let mut room = room(None);
    let now = Instant::now();
    room.claim_seat(Color::Black, alice(), conn(1), now).unwrap();
    let err = room.claim_seat(Color::Black, bob(), conn(2), now).unwrap_err();
    assert_eq!(err, RoomError::SeatTaken(Color::Black));

    // The next joiner takes the remaining seat.
    let joined = room.join(&bob(), conn(2), now);
    assert_eq!(joined.seat, Some(Color::White));
}

#[test]
fn test_detach_keeps_seat_and_reconnect_reclaims_it() {
    let mut room = active_room(None);

    let departure = room.detach(conn(2)).unwrap();
    assert_eq!(departure.seat, Some(Color::Black));
    assert!(!departure.player.connected);
    assert_eq!(room.status(), RoomStatus::Active);

    // A different identity cannot take the vacated connection's seat.
    let carol_join = room.join(&carol(), conn(3), Instant::now());
    assert_eq!(carol_join.seat, None);

    let back = room.join(&bob(), conn(4), Instant::now());
    assert_eq!(back.seat, Some(Color::Black));
    assert!(back.reconnected);
    assert!(room.players().black.unwrap().connected);
}

#[test]
fn test_detach_unknown_connection_returns_none() {
    let mut room = active_room(None);
    assert!(room.detach(conn(77)).is_none());
}

#[test]
fn test_spectator_detach_removes_spectator() {
    let mut room = active_room(None);
    room.join(&carol(), conn(3), Instant::now());
    let departure = room.detach(conn(3)).unwrap();
    assert_eq!(departure.seat, None);
    assert_eq!(room.spectator_count(), 0);
}

// =========================================================================
// Moves
// =========================================================================

#[test]
fn test_try_move_wrong_turn_leaves_room_untouched() {
    let mut room = active_room(None);
    let before_board = ChessRules.serialize(room.board());

    let err = room
        .try_move(&ChessRules, conn(2), &mv("e7e5"), Instant::now())
        .unwrap_err();

    assert_eq!(
        err,
        RoomError::WrongTurn {
            seat: Color::Black,
            turn: Color::White
        }
    );
    assert_eq!(err.code(), 409);
    assert_eq!(ChessRules.serialize(room.board()), before_board);
    assert!(room.moves().is_empty());
}

#[test]
fn test_try_move_illegal_rejected_without_mutation() {
    let mut room = active_room(None);
    let err = room
        .try_move(&ChessRules, conn(1), &mv("e2e5"), Instant::now())
        .unwrap_err();
    assert!(matches!(err, RoomError::IllegalMove(_)));
    assert_eq!(err.code(), 400);
    assert!(room.moves().is_empty());
    assert_eq!(ChessRules.turn(room.board()), Color::White);
}

#[test]
fn test_try_move_by_spectator_rejected() {
    let mut room = active_room(None);
    room.join(&carol(), conn(3), Instant::now());
    let err = room
        .try_move(&ChessRules, conn(3), &mv("e2e4"), Instant::now())
        .unwrap_err();
    assert_eq!(err, RoomError::NotSeated);
}

#[test]
fn test_try_move_before_second_player_rejected() {
    let mut room = room(None);
    room.join(&alice(), conn(1), Instant::now());
    let err = room
        .try_move(&ChessRules, conn(1), &mv("e2e4"), Instant::now())
        .unwrap_err();
    assert_eq!(err, RoomError::NotStarted);
}

#[test]
fn test_try_move_turn_follows_engine() {
    let mut room = active_room(None);
    let applied = room
        .try_move(&ChessRules, conn(1), &mv("e2e4"), Instant::now())
        .unwrap();
    assert_eq!(applied.turn, Color::Black);
    assert_eq!(applied.turn, ChessRules.turn(room.board()));
    assert_eq!(applied.notation, "e2e4");
    assert_eq!(room.moves(), ["e2e4".to_string()]);
    assert!(applied.outcome.is_none());
}

#[test]
fn test_try_move_with_extreme_time_control_saturates_clock() {
    let mut room = active_room(Some(TimeControl {
        initial: u64::MAX,
        increment: u64::MAX,
    }));
    let now = Instant::now();
    room.try_move(&ChessRules, conn(1), &mv("e2e4"), now).unwrap();
    let clocks = room.clocks(&ChessRules, now).unwrap();
    assert_eq!(clocks.white_ms, u64::MAX);
    assert_eq!(clocks.running, Some(Color::Black));
}

#[test]
fn test_try_move_checkmate_reports_outcome() {
    let mut room = active_room(None);
    let now = Instant::now();
    for (c, m) in [(1, "f2f3"), (2, "e7e5"), (1, "g2g4")] {
        room.try_move(&ChessRules, conn(c), &mv(m), now).unwrap();
    }
    let applied = room
        .try_move(&ChessRules, conn(2), &mv("d8h4"), now)
        .unwrap();
    assert_eq!(
        applied.outcome,
        Some(Outcome::win(Color::Black, EndReason::Checkmate))
    );
}

#[test]
fn test_move_clears_pending_draw_offer() {
    let mut room = active_room(None);
    let now = Instant::now();
    room.offer_draw(conn(1), now).unwrap();
    assert_eq!(room.draw_offer(), Some(Color::White));
    room.try_move(&ChessRules, conn(1), &mv("e2e4"), now).unwrap();
    assert_eq!(room.draw_offer(), None);
}

// =========================================================================
// Draws and resignation
// =========================================================================

#[test]
fn test_offer_draw_twice_rejected() {
    let mut room = active_room(None);
    let now = Instant::now();
    assert_eq!(
        room.offer_draw(conn(1), now).unwrap(),
        DrawOffer::Offered(Color::White)
    );
    assert_eq!(
        room.offer_draw(conn(1), now).unwrap_err(),
        RoomError::DrawAlreadyOffered
    );
}

#[test]
fn test_crossing_draw_offers_agree() {
    let mut room = active_room(None);
    let now = Instant::now();
    room.offer_draw(conn(1), now).unwrap();
    assert_eq!(
        room.offer_draw(conn(2), now).unwrap(),
        DrawOffer::Agreed(Outcome::draw(EndReason::Agreement))
    );
}

#[test]
fn test_respond_to_own_offer_forbidden() {
    let mut room = active_room(None);
    let now = Instant::now();
    room.offer_draw(conn(1), now).unwrap();
    let err = room.respond_to_draw(conn(1), true, now).unwrap_err();
    assert_eq!(err, RoomError::OwnDrawOffer);
    assert_eq!(err.code(), 403);
}

#[test]
fn test_respond_without_offer_rejected() {
    let mut room = active_room(None);
    assert_eq!(
        room.respond_to_draw(conn(2), true, Instant::now())
            .unwrap_err(),
        RoomError::NoDrawOffer
    );
}

#[test]
fn test_decline_draw_clears_offer() {
    let mut room = active_room(None);
    let now = Instant::now();
    room.offer_draw(conn(1), now).unwrap();
    assert_eq!(
        room.respond_to_draw(conn(2), false, now).unwrap(),
        DrawResponse::Declined(Color::Black)
    );
    assert_eq!(room.draw_offer(), None);
}

#[test]
fn test_settle_applies_only_once() {
    let mut room = active_room(None);
    let now = Instant::now();
    let outcome = room.resign(conn(2), now).unwrap();
    assert!(room.settle(&ChessRules, outcome, now));
    assert!(!room.settle(&ChessRules, Outcome::draw(EndReason::Agreement), now));
    assert_eq!(room.outcome(), Some(outcome));
    assert_eq!(
        room.try_move(&ChessRules, conn(1), &mv("e2e4"), now)
            .unwrap_err(),
        RoomError::GameOver
    );
}

// =========================================================================
// Clocks
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_increment_resign_then_spectator() {
    let mut room = room(blitz());
    room.join(&alice(), conn(1), Instant::now());
    room.join(&bob(), conn(2), Instant::now());

    advance(Duration::from_secs(10)).await;
    let applied = room
        .try_move(&ChessRules, conn(1), &mv("e2e4"), Instant::now())
        .unwrap();
    let clocks = applied.clocks.unwrap();
    assert_eq!(clocks.white_ms, 295_000);
    assert_eq!(clocks.black_ms, 300_000);
    assert_eq!(clocks.running, Some(Color::Black));

    let outcome = room.resign(conn(2), Instant::now()).unwrap();
    assert!(room.settle(&ChessRules, outcome, Instant::now()));
    assert_eq!(room.status(), RoomStatus::Terminal);
    assert_eq!(room.outcome().unwrap().result, GameResult::White);
    assert_eq!(room.outcome().unwrap().reason, EndReason::Resignation);

    let late = room.join(&carol(), conn(3), Instant::now());
    assert_eq!(late.seat, None);
}

#[tokio::test(start_paused = true)]
async fn test_check_timeout_recomputes_from_turn_start() {
    let mut room = room(Some(TimeControl {
        initial: 30,
        increment: 0,
    }));
    room.join(&alice(), conn(1), Instant::now());
    room.join(&bob(), conn(2), Instant::now());

    advance(Duration::from_secs(29)).await;
    assert_eq!(room.check_timeout(&ChessRules, Instant::now()), None);

    advance(Duration::from_secs(1)).await;
    assert_eq!(
        room.check_timeout(&ChessRules, Instant::now()),
        Some(Outcome::win(Color::Black, EndReason::Timeout))
    );
    // The sweep never rewrites stored time.
    let view = room.clocks(&ChessRules, Instant::now()).unwrap();
    assert_eq!(view.white_ms, 0);
    assert_eq!(view.black_ms, 30_000);
}

#[tokio::test(start_paused = true)]
async fn test_white_at_zero_after_black_moves_loses_on_time() {
    let rules = ChessRules;
    let board = [mv("e2e4")]
        .iter()
        .fold(rules.initial_board(), |board, m| match rules.apply(&board, m) {
            gambit_room::MoveVerdict::Applied { board, .. } => board,
            other => panic!("unexpected {other:?}"),
        });
    let mut room = Room::restore(
        RestoredRoom {
            code: RoomCode::new("ZZZ999"),
            match_id: "m".into(),
            white: Some(alice()),
            black: Some(bob()),
            board,
            moves: vec!["e2e4".into()],
            time_control: Some(TimeControl {
                initial: 60,
                increment: 0,
            }),
            remaining: Some((Duration::ZERO, Duration::from_secs(60))),
            outcome: None,
            created_at_ms: 0,
            idle: Duration::ZERO,
        },
        Instant::now(),
    );
    room.join(&alice(), conn(1), Instant::now());
    room.join(&bob(), conn(2), Instant::now());
    assert_eq!(room.status(), RoomStatus::Active);

    advance(Duration::from_secs(2)).await;
    let applied = room
        .try_move(&rules, conn(2), &mv("e7e5"), Instant::now())
        .unwrap();
    let outcome = applied.outcome.unwrap();
    assert_eq!(outcome, Outcome::win(Color::Black, EndReason::Timeout));

    assert!(room.settle(&rules, outcome, Instant::now()));
    assert_eq!(
        room.try_move(&rules, conn(1), &mv("g1f3"), Instant::now())
            .unwrap_err(),
        RoomError::GameOver
    );
}

#[tokio::test(start_paused = true)]
async fn test_move_after_flag_loses_on_time() {
    let mut room = room(Some(TimeControl {
        initial: 5,
        increment: 2,
    }));
    room.join(&alice(), conn(1), Instant::now());
    room.join(&bob(), conn(2), Instant::now());

    advance(Duration::from_secs(6)).await;
    let applied = room
        .try_move(&ChessRules, conn(1), &mv("e2e4"), Instant::now())
        .unwrap();
    assert_eq!(
        applied.outcome,
        Some(Outcome::win(Color::Black, EndReason::Timeout))
    );
    assert_eq!(applied.clocks.unwrap().white_ms, 0);
}

#[test]
fn test_restore_without_outcome_resumes_active_and_announced() {
    let room: ChessRoom = Room::restore(
        RestoredRoom {
            code: RoomCode::new("QQQ222"),
            match_id: "m".into(),
            white: Some(alice()),
            black: Some(bob()),
            board: ChessRules.initial_board(),
            moves: Vec::new(),
            time_control: None,
            remaining: None,
            outcome: None,
            created_at_ms: 42,
            idle: Duration::ZERO,
        },
        Instant::now(),
    );
    assert_eq!(room.status(), RoomStatus::Active);
    assert!(room.start_announced());
    assert!(room.seats_offline());
    assert_eq!(room.created_at_ms(), 42);
}

#[test]
fn test_restore_carries_idle_time() {
    let now = Instant::now();
    let room: ChessRoom = Room::restore(
        RestoredRoom {
            code: RoomCode::new("QQQ333"),
            match_id: "m".into(),
            white: Some(alice()),
            black: None,
            board: ChessRules.initial_board(),
            moves: Vec::new(),
            time_control: None,
            remaining: None,
            outcome: None,
            created_at_ms: 0,
            idle: Duration::from_secs(30),
        },
        now,
    );
    assert_eq!(room.status(), RoomStatus::Waiting);
    assert_eq!(
        now.saturating_duration_since(room.last_activity()),
        Duration::from_secs(30)
    );
}
