//! Retry with exponential back-off and jitter for sheet exports.

use std::future::Future;
use std::time::Duration;

use crate::error::SheetError;

/// Upper bound on a single back-off sleep.
const MAX_DELAY_MS: u64 = 60_000;

/// Timeouts, connection failures, and 5xx responses are transient; anything
/// else (4xx, unshared sheets, malformed CSV) will not improve on retry.
pub(crate) fn is_retriable(err: &SheetError) -> bool {
    match err {
        SheetError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        SheetError::Io { .. }
        | SheetError::Csv { .. }
        | SheetError::NotShared(_)
        | SheetError::HeaderNotFound(_)
        | SheetError::InvalidSource(_) => false,
    }
}

/// Sleep before retry number `attempt` (1-based): `base_ms × 2^(attempt-1)`,
/// capped at [`MAX_DELAY_MS`], then scaled by `jitter` (expected in `0.75..=1.25`).
fn backoff_delay(attempt: u32, base_ms: u64, jitter: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let capped = base_ms.saturating_mul(1u64 << exponent).min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let ms = (capped as f64 * jitter) as u64;
    Duration::from_millis(ms)
}

/// Runs `operation`, retrying transient failures up to `max_retries` times.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, SheetError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SheetError>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }
        attempt += 1;
        let delay = backoff_delay(attempt, backoff_base_ms, rand::random::<f64>() * 0.5 + 0.75);
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "sheet export failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
