//! In-memory board used by the host binary and tests.
//!
//! Clones share one board, so a test (or the operator console) can move
//! pieces while the sweep loop owns a reader handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ReadOutcome, SweepReader};
use crate::board::{Position, TokenId};

/// Deterministic fault bucket: `seed` maps to [0, 1) and faults below `rate`.
pub fn should_fault(seed: u64, rate: f64) -> bool {
    let v = (seed % 10_000) as f64 / 10_000.0;
    v < rate
}

#[derive(Debug, Default)]
struct Inner {
    squares: HashMap<Position, TokenId>,
    forced_faults: HashMap<Position, u32>,
    reinits: HashMap<Position, u32>,
    fault_rate: f64,
    reads: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedBoard {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn place(&self, position: Position, token: TokenId) -> Option<TokenId> {
        self.lock().squares.insert(position, token)
    }

    pub fn lift(&self, position: Position) -> Option<TokenId> {
        self.lock().squares.remove(&position)
    }

    /// Physically move whatever is on `from` onto `to`, knocking off any occupant.
    pub fn slide(&self, from: Position, to: Position) -> Option<TokenId> {
        let mut inner = self.lock();
        let token = inner.squares.remove(&from)?;
        inner.squares.insert(to, token)
    }

    pub fn clear(&self) {
        self.lock().squares.clear();
    }

    /// Make the next `count` reads of `position` report a sensor fault.
    pub fn fail_next(&self, position: Position, count: u32) {
        *self.lock().forced_faults.entry(position).or_insert(0) += count;
    }

    pub fn pending_faults(&self, position: Position) -> u32 {
        self.lock().forced_faults.get(&position).copied().unwrap_or(0)
    }

    /// Random-looking but reproducible faults on every square.
    pub fn set_fault_rate(&self, rate: f64) {
        self.lock().fault_rate = rate.clamp(0.0, 1.0);
    }

    pub fn reinit_count(&self, position: Position) -> u32 {
        self.lock().reinits.get(&position).copied().unwrap_or(0)
    }

    pub fn occupant(&self, position: Position) -> Option<TokenId> {
        self.lock().squares.get(&position).copied()
    }

    pub fn occupied(&self) -> usize {
        self.lock().squares.len()
    }
}

#[async_trait]
impl SweepReader for ScriptedBoard {
    async fn read(&mut self, position: Position) -> ReadOutcome {
        let mut inner = self.lock();
        inner.reads = inner.reads.wrapping_add(1);
        if let Some(n) = inner.forced_faults.get_mut(&position) {
            if *n > 0 {
                *n -= 1;
                return ReadOutcome::Fault;
            }
        }
        let seed = inner.reads.wrapping_mul(7919).wrapping_add(position.index() as u64);
        if inner.fault_rate > 0.0 && should_fault(seed, inner.fault_rate) {
            return ReadOutcome::Fault;
        }
        match inner.squares.get(&position) {
            Some(t) => ReadOutcome::Present(*t),
            None => ReadOutcome::Empty,
        }
    }

    async fn reinitialize(&mut self, position: Position) {
        *self.lock().reinits.entry(position).or_insert(0) += 1;
    }
}
