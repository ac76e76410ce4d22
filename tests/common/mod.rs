//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use boardsync::board::{Position, TokenId};
use boardsync::engine::{BoardEngine, Scanner};
use boardsync::lifecycle::Phase;
use boardsync::notify::{Transport, TransportError};
use boardsync::peripherals::LogPeripherals;
use boardsync::roster::Roster;
use boardsync::sensor::sim::ScriptedBoard;
use boardsync::state::Config;

pub fn sq(s: &str) -> Position {
    s.parse().unwrap()
}

pub fn test_config() -> Config {
    Config {
        sensor_settle_us: 0,
        send_backoff_ms: 1,
        queue_capacity: 128,
        ..Config::default()
    }
}

pub struct Rig {
    pub engine: BoardEngine,
    pub board: ScriptedBoard,
    pub scanner: Scanner<ScriptedBoard>,
}

impl Rig {
    pub fn new(cfg: Config) -> Self {
        let engine = BoardEngine::new(cfg, Roster::standard(), Arc::new(LogPeripherals));
        let board = ScriptedBoard::new();
        let scanner = engine.scanner(board.clone());
        Self { engine, board, scanner }
    }

    pub fn token_at(&self, s: &str) -> TokenId {
        self.engine
            .context()
            .snapshot()
            .map
            .lookup_by_position(&sq(s))
            .unwrap()
    }

    pub fn drain(&self) -> Vec<String> {
        std::iter::from_fn(|| self.engine.context().queue().try_pop())
            .map(|r| r.as_str().to_string())
            .collect()
    }

    pub fn place_opening(&self) {
        for (pos, t) in self.engine.context().roster().opening_layout() {
            self.board.place(pos, t);
        }
    }

    /// Connect, set up the opening position and confirm the start.
    pub async fn playing(cfg: Config) -> Self {
        let mut rig = Self::new(cfg);
        rig.engine.handler().connect();
        rig.place_opening();
        let report = rig.scanner.sweep().await;
        assert!(report.setup_completed);
        rig.engine.handler().handle_text("start_confirmed").unwrap();
        assert_eq!(rig.engine.context().phase(), Phase::Playing);
        rig.drain();
        rig
    }
}

/// Transport that records what it was asked to send.
#[derive(Default)]
pub struct CollectTransport {
    pub sent: Mutex<Vec<String>>,
}

impl CollectTransport {
    pub fn records(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for CollectTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }
}
