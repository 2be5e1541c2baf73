//! Engine error taxonomy and retry helpers.
//!
//! Pure kernels (fixed-point math, swap simulation, evaluation) never return
//! errors; they degrade to zeroed results. Errors here cover collaborator
//! I/O, malformed batch items, and invariant violations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

/// Bound on a single collaborator fetch. Exceeding it surfaces as
/// [`EngineError::Timeout`], which is retried like any transient failure.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry attempts for transient collaborator failures.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum EngineError {
    /// Retryable I/O failure from a collaborator (RPC hiccup, store busy).
    #[error("transient failure: {0}")]
    Transient(String),

    /// External fetch exceeded [`FETCH_TIMEOUT`].
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Requested entity does not exist (pool, strategy id).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request item; reported per-item without aborting a batch.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Pool price older than the freshness threshold.
    #[error("stale data: {0}")]
    StaleData(String),

    /// Zero liquidity, zero probability mass, zero capital.
    #[error("numerically degenerate: {0}")]
    NumericalDegenerate(String),

    /// Internal invariant violation. Logged, counted, current item abandoned;
    /// the pipeline keeps running.
    #[error("invariant violated: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_) | EngineError::Timeout(_))
    }
}

/// Run a fallible async operation with a per-attempt timeout and exponential
/// backoff + jitter, up to [`RETRY_ATTEMPTS`] attempts.
///
/// Non-retryable errors abort immediately. A timeout on the final attempt is
/// reported as `Timeout`; earlier timeouts are retried.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut f: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut last_err = EngineError::Transient(format!("{op_name}: no attempts made"));

    for attempt in 0..RETRY_ATTEMPTS {
        let result = match tokio::time::timeout(FETCH_TIMEOUT, f()).await {
            Ok(r) => r,
            Err(_) => Err(EngineError::Timeout(FETCH_TIMEOUT)),
        };

        match result {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt + 1 < RETRY_ATTEMPTS => {
                let base = BACKOFF_BASE * 2u32.pow(attempt);
                let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
                let delay = base + Duration::from_millis(jitter);
                warn!(
                    "{op_name}: attempt {}/{} failed ({e}), retrying in {delay:?}",
                    attempt + 1,
                    RETRY_ATTEMPTS
                );
                tokio::time::sleep(delay).await;
                last_err = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err)
}
