use crate::ClientError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff: `base_delay`, doubling per attempt, at most
/// `max_attempts` tries. Rate-limit responses that ask for a longer wait
/// than the computed backoff get the wait they asked for.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let mut delay = self.base_delay * 2u32.saturating_pow(attempt);
                    if let ClientError::RateLimited { retry_after_secs } = &err {
                        delay = delay.max(Duration::from_secs(*retry_after_secs));
                    }
                    warn!(operation, attempt, error = %err, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(
        calls: Arc<AtomicU32>,
        fail_times: u32,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, ClientError>> + Send>>
    {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < fail_times {
                    Err(ClientError::Api {
                        status: 503,
                        message: String::new(),
                    })
                } else {
                    Ok(n)
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(10),
            max_attempts: 3,
        };
        let result = policy.run("test", flaky(calls.clone(), 2)).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(10),
            max_attempts: 3,
        };
        let result = policy.run("test", flaky(calls.clone(), 10)).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();
        let counter = calls.clone();
        let result: Result<(), _> = policy
            .run("test", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ClientError::Api {
                        status: 404,
                        message: String::new(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
