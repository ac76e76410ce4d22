use std::collections::HashMap;

use serde_json::json;

use crate::board::Position;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::reliability::circuit::CircuitBreaker;

/// Tracks squares whose reader keeps coming back indeterminate.
///
/// Owned by the sweep loop; nothing else reads sensors.
#[derive(Debug, Clone)]
pub struct SensorHealth {
    threshold: u32,
    squares: HashMap<Position, CircuitBreaker>,
}

impl SensorHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            squares: HashMap::new(),
        }
    }

    pub fn record_read(&mut self, position: Position) {
        if let Some(cb) = self.squares.get_mut(&position) {
            if cb.record_success() {
                log(
                    Level::Info,
                    Domain::Sensor,
                    "recovered",
                    obj(&[("square", v_str(&position.to_string()))]),
                );
            }
        }
    }

    pub fn record_indeterminate(&mut self, position: Position) {
        let threshold = self.threshold;
        let cb = self
            .squares
            .entry(position)
            .or_insert_with(|| CircuitBreaker::new(threshold));
        if cb.record_failure() {
            log(
                Level::Error,
                Domain::Sensor,
                "degraded",
                obj(&[
                    ("square", v_str(&position.to_string())),
                    ("consecutive", json!(cb.failures)),
                ]),
            );
        }
    }

    pub fn is_degraded(&self, position: &Position) -> bool {
        self.squares.get(position).map(|cb| !cb.allow()).unwrap_or(false)
    }

    pub fn degraded(&self) -> Vec<Position> {
        let mut out: Vec<Position> = self
            .squares
            .iter()
            .filter(|(_, cb)| !cb.allow())
            .map(|(p, _)| *p)
            .collect();
        out.sort();
        out
    }
}
