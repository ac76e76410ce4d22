use std::collections::{BTreeMap, BTreeSet, HashSet};

use sha2::{Digest, Sha256};

use crate::board::{IdentityPositionMap, Position, TokenId};
use crate::lifecycle::{next_phase, LifecycleEvent, Phase, TransitionError};
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone)]
pub struct Config {
    /// Re-reads after a sensor self-test failure before the square is skipped.
    pub sensor_retries: u32,
    /// Settle time after re-initializing a sensor, doubled per retry.
    pub sensor_settle_us: u64,
    /// Consecutive indeterminate sweeps before a square is flagged degraded.
    pub sensor_degrade_after: u32,
    pub queue_capacity: usize,
    pub sweep_interval_ms: u64,
    pub send_retries: u32,
    pub send_backoff_ms: u64,
    pub roster_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_retries: 1,
            sensor_settle_us: 1000,
            sensor_degrade_after: 3,
            queue_capacity: 10,
            sweep_interval_ms: 20,
            send_retries: 2,
            send_backoff_ms: 20,
            roster_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            sensor_retries: std::env::var("SENSOR_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.sensor_retries),
            sensor_settle_us: std::env::var("SENSOR_SETTLE_US").ok().and_then(|v| v.parse().ok()).unwrap_or(d.sensor_settle_us),
            sensor_degrade_after: std::env::var("SENSOR_DEGRADE_AFTER").ok().and_then(|v| v.parse().ok()).unwrap_or(d.sensor_degrade_after),
            queue_capacity: std::env::var("QUEUE_CAP").ok().and_then(|v| v.parse().ok()).filter(|c: &usize| *c > 0).unwrap_or(d.queue_capacity),
            sweep_interval_ms: std::env::var("SWEEP_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.sweep_interval_ms),
            send_retries: std::env::var("SEND_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.send_retries),
            send_backoff_ms: std::env::var("SEND_BACKOFF_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.send_backoff_ms),
            roster_path: std::env::var("ROSTER_PATH").ok().filter(|p| !p.trim().is_empty()),
        }
    }
}

/// Everything the sweep loop and the command handler share.
///
/// Lives behind a single mutex in [`crate::engine::BoardContext`]; every
/// method here assumes the caller holds it.
#[derive(Debug, Clone)]
pub struct BoardState {
    pub map: IdentityPositionMap,
    /// Tokens believed lifted but not yet confirmed moved.
    pub hover: HashSet<TokenId>,
    pub phase: Phase,
    /// Squares currently alerting on an unrecognized tag.
    pub foreign: BTreeMap<Position, TokenId>,
    /// Setup squares holding the wrong piece.
    pub invalid: BTreeSet<Position>,
    /// Bumped on every reset so an in-flight sweep can notice it is stale.
    pub generation: u64,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    pub fn new() -> Self {
        Self {
            map: IdentityPositionMap::new(),
            hover: HashSet::new(),
            phase: Phase::Disconnected,
            foreign: BTreeMap::new(),
            invalid: BTreeSet::new(),
            generation: 0,
        }
    }

    /// Apply a lifecycle event, resetting board state where the phase demands it.
    pub fn transition(&mut self, event: LifecycleEvent) -> Result<(Phase, Phase), TransitionError> {
        let prev = self.phase;
        let next = next_phase(prev, event)?;
        if matches!(event, LifecycleEvent::GameEnded | LifecycleEvent::PeerDisconnected) {
            self.reset();
        }
        self.phase = next;
        if prev != next {
            log(
                Level::Info,
                Domain::Lifecycle,
                "phase",
                obj(&[
                    ("prev", v_str(prev.as_str())),
                    ("next", v_str(next.as_str())),
                    ("trigger", v_str(&format!("{:?}", event))),
                    ("state_hash", v_str(&self.digest())),
                ]),
            );
        }
        Ok((prev, next))
    }

    /// End the game and settle back into setup in one step.
    pub fn end_game(&mut self) -> Result<Phase, TransitionError> {
        self.transition(LifecycleEvent::GameEnded)?;
        let (_, next) = self.transition(LifecycleEvent::ResetDone)?;
        Ok(next)
    }

    fn reset(&mut self) {
        self.map.clear();
        self.hover.clear();
        self.foreign.clear();
        self.invalid.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// SHA-256 over phase and sorted map entries, hex encoded.
    pub fn digest(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.phase.as_str().as_bytes());
        for (pos, token) in self.map.entries() {
            h.update([pos.index() as u8]);
            h.update(token.as_bytes());
        }
        let mut hovering: Vec<String> = self.hover.iter().map(|t| t.to_hex()).collect();
        hovering.sort();
        for t in hovering {
            h.update(t.as_bytes());
        }
        hex::encode(h.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_firmware_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.sensor_retries, 1);
        assert_eq!(cfg.queue_capacity, 10);
    }

    #[test]
    fn test_game_end_resets_and_bumps_generation() {
        let mut s = BoardState::new();
        s.transition(LifecycleEvent::PeerConnected).unwrap();
        let t = TokenId::from_bytes(&[7, 7, 7, 7]).unwrap();
        s.map.insert(t, "e2".parse().unwrap());
        s.hover.insert(t);
        s.invalid.insert("a3".parse().unwrap());
        let g = s.generation;

        assert_eq!(s.end_game().unwrap(), Phase::AwaitingSetup);
        assert!(s.map.is_empty());
        assert!(s.hover.is_empty());
        assert!(s.invalid.is_empty());
        assert_eq!(s.generation, g + 1);
    }

    #[test]
    fn test_illegal_transition_leaves_state_alone() {
        let mut s = BoardState::new();
        let before = s.digest();
        assert!(s.transition(LifecycleEvent::StartConfirmed).is_err());
        assert_eq!(s.phase, Phase::Disconnected);
        assert_eq!(s.digest(), before);
    }

    #[test]
    fn test_digest_tracks_map_contents() {
        let mut s = BoardState::new();
        let empty = s.digest();
        s.map.insert(TokenId::from_bytes(&[1]).unwrap(), "a1".parse().unwrap());
        assert_ne!(s.digest(), empty);
    }
}
