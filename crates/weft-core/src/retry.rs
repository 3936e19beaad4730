use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::WeftError;

/// Retry policy for fallible node operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of re-attempts after the first failure.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.saturating_pow(attempt)).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// The retry/backoff policy is opaque to callers: every failure is
/// retried, backoff doubles per attempt up to the configured cap, and
/// the backoff sleep is raced against `token`. Cancellation during a
/// backoff returns [`WeftError::Cancelled`]; cancellation inside `op`
/// itself is up to `op` honoring the token it is handed.
pub async fn retry<T, F, Fut>(
    config: &RetryConfig,
    token: &CancellationToken,
    op: F,
) -> Result<T, WeftError>
where
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, WeftError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match op(token.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < config.max_retries {
                    let backoff = calculate_backoff(attempt, config);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying failed operation"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = token.cancelled() => return Err(WeftError::Cancelled),
                    }
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(WeftError::Cancelled))
}
