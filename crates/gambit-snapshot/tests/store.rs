//! Snapshot store tests against a real temp directory.

use std::time::Duration;

use gambit_protocol::{Color, EndReason, Outcome, RoomCode, TimeControl};
use gambit_snapshot::{
    RemainingTimes, RoomSnapshot, SeatRecord, SeatRecords, SnapshotConfig, SnapshotStore,
    SnapshotWriter,
};

const NOW: u64 = 10_000_000;

fn store_in(dir: &tempfile::TempDir) -> SnapshotStore {
    SnapshotStore::new(&SnapshotConfig {
        path: dir.path().join("snap").join("rooms.json"),
        ..SnapshotConfig::default()
    })
}

fn seat(id: &str) -> Option<SeatRecord> {
    Some(SeatRecord {
        id: id.into(),
        display_name: id.to_uppercase(),
        guest: false,
    })
}

fn active(code: &str) -> RoomSnapshot {
    RoomSnapshot {
        code: RoomCode::new(code),
        match_id: format!("match-{code}"),
        seats: SeatRecords {
            white: seat("alice"),
            black: seat("bob"),
        },
        board_serialization: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".into(),
        move_log: vec!["e2e4".into()],
        turn: Some(Color::Black),
        is_terminal: false,
        outcome: None,
        time_control: Some(TimeControl {
            initial: 300,
            increment: 5,
        }),
        remaining_times: Some(RemainingTimes {
            white_ms: 295_000,
            black_ms: 300_000,
        }),
        created_at: NOW - 5_000,
        last_activity: NOW - 1_000,
    }
}

#[tokio::test]
async fn test_save_then_load_round_trips_active_rooms() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let mut finished = active("DONE22");
    finished.is_terminal = true;
    finished.outcome = Some(Outcome::win(Color::White, EndReason::Resignation));

    let written = store
        .try_save(&[active("ABC234"), finished], NOW)
        .await
        .unwrap();
    assert_eq!(written, 1);

    let loaded = store.try_load(NOW).await.unwrap();
    assert_eq!(loaded, vec![active("ABC234")]);
}

#[tokio::test]
async fn test_save_excludes_rooms_idle_past_retention() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let mut stale = active("OLD777");
    stale.last_activity = NOW - Duration::from_secs(3 * 60 * 60).as_millis() as u64;

    assert_eq!(store.try_save(&[stale, active("NEW888")], NOW).await.unwrap(), 1);
    let loaded = store.load(NOW).await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].code, RoomCode::new("NEW888"));
}

#[tokio::test]
async fn test_load_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert!(store.try_load(NOW).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_corrupt_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    tokio::fs::create_dir_all(store.path().parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(store.path(), b"{ this is not json").await.unwrap();

    assert!(store.try_load(NOW).await.is_err());
    assert!(store.load(NOW).await.is_empty());
}

#[tokio::test]
async fn test_load_skips_bad_rooms_and_accepts_bare_array() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    tokio::fs::create_dir_all(store.path().parent().unwrap())
        .await
        .unwrap();
    let body = format!(
        r#"[{{"code":"GOOD22","lastActivity":{NOW},"futureField":true}},{{"noCode":1}}]"#
    );
    tokio::fs::write(store.path(), body).await.unwrap();

    let loaded = store.try_load(NOW).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].code, RoomCode::new("GOOD22"));
}

#[tokio::test]
async fn test_save_replaces_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.try_save(&[active("ONE222")], NOW).await.unwrap();
    store.try_save(&[active("TWO333")], NOW).await.unwrap();

    let loaded = store.try_load(NOW).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].code, RoomCode::new("TWO333"));
}

#[tokio::test]
async fn test_writer_close_flushes_latest_submission() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let writer = SnapshotWriter::spawn(store.clone());
    writer.submit(vec![active("FIRST2")], NOW);
    writer.submit(vec![active("LAST99")], NOW);
    writer.close().await;

    let loaded = store.try_load(NOW).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].code, RoomCode::new("LAST99"));
}
