//! Retry logic with exponential backoff for broker calls.
//!
//! Only transient failures (transport errors, timeouts, 5xx) are retried.
//! Everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::BrokerError;

/// Maximum number of retry attempts after the initial request.
pub(crate) const MAX_RETRIES: u32 = 3;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// Run `f` with exponential backoff on transient errors.
///
/// `f` is called at most `MAX_RETRIES + 1` times.
pub(crate) async fn retry<F, Fut, T>(operation: &str, f: F) -> Result<T, BrokerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    retry_with_delay(operation, Duration::from_millis(BASE_DELAY_MS), f).await
}

pub(crate) async fn retry_with_delay<F, Fut, T>(
    operation: &str,
    base_delay: Duration,
    f: F,
) -> Result<T, BrokerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = base_delay * 2u32.pow(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    operation,
                    "broker request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    f().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> BrokerError {
        BrokerError::Api {
            endpoint: "http://broker".into(),
            status: 503,
            body: "busy".into(),
        }
    }

    #[tokio::test]
    async fn exhausts_attempts_on_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry_with_delay("unbind", Duration::from_millis(1), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = retry_with_delay("unbind", Duration::from_millis(1), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(BrokerError::Rejected("no".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(BrokerError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_with_delay("unbind", Duration::from_millis(1), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
