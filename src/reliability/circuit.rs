/// Consecutive-failure breaker.
///
/// Opens after `threshold` failures in a row; a single success closes it
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    pub state: CircuitState,
    pub failures: u32,
    pub threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self { state: CircuitState::Closed, failures: 0, threshold: threshold.max(1) }
    }

    /// Returns true when this success closed a previously open breaker.
    pub fn record_success(&mut self) -> bool {
        let was_open = self.state == CircuitState::Open;
        self.failures = 0;
        self.state = CircuitState::Closed;
        was_open
    }

    /// Returns true when this failure tripped the breaker open.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold && self.state == CircuitState::Closed {
            self.state = CircuitState::Open;
            return true;
        }
        false
    }

    pub fn allow(&self) -> bool {
        matches!(self.state, CircuitState::Closed)
    }
}
