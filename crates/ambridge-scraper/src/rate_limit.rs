//! Retry with exponential backoff for transient product API failures.
//!
//! Rate limits, network failures and 5xx responses are retried. Everything
//! else, including empty or incomplete product payloads, fails immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

fn is_retriable(err: &ScraperError) -> bool {
    match err {
        ScraperError::RateLimited { .. } | ScraperError::Http(_) => true,
        ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

const MAX_DELAY_MS: u64 = 60_000;

/// Runs `operation`, retrying retriable errors up to `max_retries` extra
/// times. The wait before retry `n` (zero-based) is `backoff_base_secs * 2^n`
/// seconds, capped at one minute, with ±25% jitter.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 0u32;

    loop {
        let last_err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retriable(&err) || attempt >= max_retries => return Err(err),
            Err(err) => err,
        };

        let computed_ms = backoff_base_secs
            .saturating_mul(1000)
            .saturating_mul(1u64 << attempt.min(10))
            .min(MAX_DELAY_MS);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let delay_ms = (computed_ms as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %last_err,
            "transient product API error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn count_calls<T>(
        max_retries: u32,
        mut outcome: impl FnMut(u32) -> Result<T, ScraperError>,
    ) -> (Result<T, ScraperError>, u32) {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(max_retries, 0, || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            let r = outcome(n);
            async move { r }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let (result, calls) = count_calls(2, |n| {
            if n == 0 {
                Err(ScraperError::RateLimited {
                    retry_after_secs: 0,
                })
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn retries_server_errors_until_exhausted() {
        let (result, calls) = count_calls(2, |_| {
            Err::<(), _>(ScraperError::UnexpectedStatus {
                status: 503,
                url: "https://api.example/product-details".to_owned(),
            })
        })
        .await;
        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(ScraperError::UnexpectedStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (result, calls) = count_calls(3, |_| {
            Err::<(), _>(ScraperError::UnexpectedStatus {
                status: 403,
                url: "https://api.example/product-details".to_owned(),
            })
        })
        .await;
        assert_eq!(calls, 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_product_is_not_retried() {
        let (result, calls) = count_calls(3, |_| {
            Err::<(), _>(ScraperError::EmptyProduct {
                asin: "B000000000".to_owned(),
                country: "US".to_owned(),
            })
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(ScraperError::EmptyProduct { .. })));
    }
}
