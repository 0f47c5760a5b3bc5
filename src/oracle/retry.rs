// ChapterSleuth - oracle/retry.rs
//
// Retry policy for transient oracle failures: exponential backoff with
// full jitter, a hard attempt cap, and immediate propagation of permanent
// errors. 429 responses honour the server-supplied Retry-After delay when
// it exceeds the computed backoff.

use crate::util::constants;
use crate::util::error::OracleError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behaviour on transient oracle errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Backoff base; attempt n waits up to base * 2^n.
    pub base_delay: Duration,
    /// Maximum delay between retries (backoff is capped here).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::ORACLE_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(constants::ORACLE_BACKOFF_BASE_MS),
            max_delay: Duration::from_millis(constants::ORACLE_BACKOFF_MAX_MS),
        }
    }
}

impl RetryConfig {
    /// Full-jitter delay before retrying after `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32, error: &OracleError) -> Duration {
        let ceiling = self
            .max_delay
            .min(self.base_delay.saturating_mul(1u32 << attempt.min(16)));
        let jittered = Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64));

        match error {
            OracleError::RateLimited { retry_after_secs } => {
                jittered.max(Duration::from_secs(*retry_after_secs))
            }
            _ => jittered,
        }
    }
}

/// Run `op` with retries on transient errors.
///
/// Permanent errors (client-side 4xx other than 429, malformed responses,
/// cancellation) propagate immediately; transient ones are retried until
/// the attempt budget runs out, after which `Exhausted` is returned with
/// the last error logged.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut last_error: Option<OracleError> = None;

    for attempt in 0..config.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = config.delay_for(attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient oracle failure; backing off"
                );
                last_error = Some(e);
                if attempt + 1 < config.max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(e) = last_error {
        tracing::error!(error = %e, attempts = config.max_attempts, "Oracle retry budget exhausted");
    }
    Err(OracleError::Exhausted {
        attempts: config.max_attempts,
    })
}
