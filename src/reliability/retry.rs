use std::fmt::Display;
use std::future::Future;

use rand::Rng;
use serde_json::json;
use tokio::time::{sleep, Duration};

use crate::logging::{log, obj, v_str, Domain, Level};

/// Bounded retry with exponential backoff.
///
/// `max_retries` counts re-attempts, so an operation runs at most
/// `max_retries + 1` times.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_micros(1000),
            max_delay: Duration::from_millis(50),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn sensor(max_retries: u32, settle_us: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_micros(settle_us),
            max_delay: Duration::from_micros(settle_us.saturating_mul(8)),
            jitter_factor: 0.0,
        }
    }

    pub fn transport(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(backoff_ms),
            max_delay: Duration::from_millis(backoff_ms.saturating_mul(16)),
            jitter_factor: 0.3,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential backoff with optional ±jitter, clamped to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * 2.0_f64.powi(attempt as i32);
        let clamped = base.min(self.max_delay.as_secs_f64());

        let jitter_range = clamped * self.jitter_factor;
        let jitter: f64 = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_secs_f64((clamped + jitter).max(0.0))
    }
}

/// Retry a fallible async operation, returning the last error once the
/// attempt budget is spent.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                log(
                    Level::Warn,
                    Domain::System,
                    "retry",
                    obj(&[
                        ("operation", v_str(operation_name)),
                        ("attempt", json!(attempt + 1)),
                        ("max_attempts", json!(config.attempts())),
                        ("error", v_str(&e.to_string())),
                        ("delay_ms", json!(delay.as_millis() as u64)),
                    ]),
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter_factor: 0.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_sensor_profile_has_no_jitter() {
        let cfg = RetryConfig::sensor(1, 1000);
        assert_eq!(cfg.attempts(), 2);
        assert_eq!(cfg.delay_for_attempt(0), Duration::from_micros(1000));
    }

    #[tokio::test]
    async fn test_retry_eventual_success() {
        let config = RetryConfig::transport(3, 1);
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<i32, String> = retry_async(&config, "test", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let config = RetryConfig::transport(1, 1);
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<(), String> = retry_async(&config, "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
