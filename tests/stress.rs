//! Faulty sensors, a flooded channel and acks racing the sweep loop.

mod common;

use std::time::Duration;

use tokio::sync::watch;

use boardsync::engine::run_scan_loop;
use boardsync::events::SemanticEvent;
use boardsync::lifecycle::Phase;
use boardsync::roster::FULL_SET;
use boardsync::sensor::SweepReader;
use boardsync::state::Config;
use boardsync::verify::invariants::assert_board_invariants;

use common::{sq, test_config, Rig};

#[tokio::test]
async fn faulty_square_degrades_without_stalling_the_board() {
    let cfg = Config {
        sensor_retries: 1,
        sensor_degrade_after: 3,
        ..test_config()
    };
    let mut rig = Rig::playing(cfg).await;
    // two attempts per sweep: four sweeps' worth of faults
    rig.board.fail_next(sq("e2"), 8);

    for _ in 0..3 {
        let report = rig.scanner.sweep().await;
        assert_eq!(report.indeterminate, vec![sq("e2")]);
        assert!(!report.aborted);
    }
    assert!(rig.scanner.health().is_degraded(&sq("e2")));
    assert!(rig.board.reinit_count(sq("e2")) >= 3);

    // an indeterminate square keeps its last known state
    let state = rig.engine.context().snapshot();
    assert!(state.map.contains_position(&sq("e2")));
    assert!(state.hover.is_empty());

    // the rest of the board keeps classifying
    rig.board.slide(sq("d2"), sq("d4"));
    let report = rig.scanner.sweep().await;
    assert!(report.events.contains(&SemanticEvent::Move { from: sq("d2"), to: sq("d4") }));
    assert_eq!(report.indeterminate, vec![sq("e2")]);
    assert_eq!(rig.board.pending_faults(sq("e2")), 0);

    // one clean read heals the square
    let report = rig.scanner.sweep().await;
    assert!(report.indeterminate.is_empty());
    assert!(!rig.scanner.health().is_degraded(&sq("e2")));
}

#[tokio::test]
async fn single_fault_is_absorbed_by_retry() {
    let mut rig = Rig::playing(test_config()).await;
    rig.board.fail_next(sq("a1"), 1);
    let report = rig.scanner.sweep().await;
    assert!(report.indeterminate.is_empty());
    assert!(report.events.is_empty());
    assert_eq!(rig.board.reinit_count(sq("a1")), 1);
}

#[tokio::test]
async fn flooded_channel_keeps_the_newest_records() {
    let cfg = Config {
        queue_capacity: 3,
        ..test_config()
    };
    let mut rig = Rig::new(cfg);
    rig.engine.handler().connect();
    rig.place_opening();
    let report = rig.scanner.sweep().await;
    assert!(report.setup_completed);

    let queue = rig.engine.context().queue().clone();
    assert_eq!(queue.len(), 3);
    assert_eq!(queue.overflow_count(), (FULL_SET + 1 - 3) as u64);
    assert_eq!(
        rig.drain(),
        vec!["placement_valid:g8", "placement_valid:h8", "ready_to_start"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn acks_racing_the_sweep_loop_keep_the_map_consistent() {
    let cfg = Config {
        sweep_interval_ms: 1,
        ..test_config()
    };
    let rig = Rig::playing(cfg).await;
    let Rig { engine, board, scanner } = rig;
    let (stop_tx, stop_rx) = watch::channel(false);
    let scan = tokio::spawn(run_scan_loop(scanner, Duration::from_millis(1), stop_rx));

    let handler = engine.handler();
    let moves = [
        ("e2", "e4"),
        ("e7", "e5"),
        ("g1", "f3"),
        ("b8", "c6"),
        ("f1", "c4"),
        ("g8", "f6"),
    ];
    for (from, to) in moves {
        board.slide(sq(from), sq(to));
        tokio::time::sleep(Duration::from_millis(3)).await;
        handler.handle_text(&format!("move_ack:{from}{to}")).unwrap();
        assert_board_invariants(&engine.context().snapshot()).unwrap();
    }
    // capture on f7
    board.slide(sq("c4"), sq("f7"));
    tokio::time::sleep(Duration::from_millis(3)).await;
    handler.handle_text("capture_ack:c4f7").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    stop_tx.send(true).unwrap();
    let sweeps = scan.await.unwrap();
    assert!(sweeps > 0);

    let state = engine.context().snapshot();
    assert_board_invariants(&state).unwrap();
    assert_eq!(state.phase, Phase::Playing);
    assert_eq!(state.map.len(), FULL_SET - 1);
    assert!(state.hover.is_empty());
    for (pos, token) in state.map.entries() {
        assert_eq!(board.occupant(pos), Some(token), "{pos} disagrees");
    }
}

#[tokio::test]
async fn reset_during_sweep_aborts_remaining_squares() {
    struct ResettingReader {
        inner: boardsync::sensor::sim::ScriptedBoard,
        handler: boardsync::engine::CommandHandler,
        trip_at: boardsync::board::Position,
    }

    #[async_trait::async_trait]
    impl SweepReader for ResettingReader {
        async fn read(&mut self, position: boardsync::board::Position) -> boardsync::sensor::ReadOutcome {
            if position == self.trip_at {
                let _ = self.handler.handle_text("game_ended");
            }
            self.inner.read(position).await
        }
    }

    let rig = Rig::playing(test_config()).await;
    rig.board.lift(sq("e2"));
    rig.board.lift(sq("e7"));
    let reader = ResettingReader {
        inner: rig.board.clone(),
        handler: rig.engine.handler(),
        trip_at: sq("a5"),
    };
    let mut scanner = rig.engine.scanner(reader);
    let report = scanner.sweep().await;
    assert!(report.aborted);
    // e2 was classified before the reset, e7 never was
    assert_eq!(report.events, vec![SemanticEvent::Hover { at: sq("e2") }]);
    let state = rig.engine.context().snapshot();
    assert_eq!(state.phase, Phase::AwaitingSetup);
    assert!(state.map.is_empty());
    assert!(state.hover.is_empty());
}

#[tokio::test]
async fn noisy_sensors_never_invent_events() {
    let mut rig = Rig::playing(test_config()).await;
    let before = rig.engine.context().snapshot().digest();
    rig.board.set_fault_rate(0.5);

    let mut indeterminate = 0;
    for _ in 0..20 {
        let report = rig.scanner.sweep().await;
        assert!(report.events.is_empty(), "spurious {:?}", report.events);
        assert!(!report.aborted);
        indeterminate += report.indeterminate.len();
    }
    assert!(indeterminate > 0);
    let state = rig.engine.context().snapshot();
    assert_eq!(state.digest(), before);
    assert!(state.hover.is_empty());

    // once the noise stops every square reads cleanly again
    rig.board.set_fault_rate(0.0);
    let report = rig.scanner.sweep().await;
    assert!(report.indeterminate.is_empty());
    assert!(rig.scanner.health().degraded().is_empty());
}
