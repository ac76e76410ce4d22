//! Sensor driver seam and the bounded-retry read policy.

pub mod health;
pub mod sim;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::sleep;

use crate::board::{Position, TokenId};
use crate::logging::{agg_increment, log, log_sensor_fault, obj, v_str, Domain, Level};
use crate::reliability::retry::RetryConfig;

/// Raw result of one read attempt on one square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Empty,
    Present(TokenId),
    /// The reader failed its self-check; says nothing about the square.
    Fault,
}

/// A read that can be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Empty,
    Present(TokenId),
}

/// One presence reader per square, driven by the sensor collaborator.
#[async_trait]
pub trait SweepReader: Send {
    async fn read(&mut self, position: Position) -> ReadOutcome;

    /// Re-initialize the reader for `position` after a fault.
    async fn reinitialize(&mut self, _position: Position) {}
}

/// Read `position`, re-initializing and retrying on `Fault` up to the
/// configured budget.
///
/// `None` means the square is indeterminate for this sweep: callers keep
/// whatever they knew about it before.
pub async fn resolve<R>(reader: &mut R, position: Position, retry: &RetryConfig) -> Option<Reading>
where
    R: SweepReader + ?Sized,
{
    let attempts = retry.attempts();
    for attempt in 0..attempts {
        match reader.read(position).await {
            ReadOutcome::Empty => return Some(Reading::Empty),
            ReadOutcome::Present(token) => return Some(Reading::Present(token)),
            ReadOutcome::Fault => {
                log_sensor_fault(&position.to_string(), attempt + 1, attempts);
                if attempt + 1 < attempts {
                    reader.reinitialize(position).await;
                    sleep(retry.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
    agg_increment("indeterminate");
    log(
        Level::Warn,
        Domain::Sensor,
        "indeterminate",
        obj(&[
            ("square", v_str(&position.to_string())),
            ("attempts", json!(attempts)),
        ]),
    );
    None
}
