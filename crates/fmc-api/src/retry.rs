// Rate-limit retry strategy.
//
// Wraps a single attempt of any remote call and re-runs it while the
// controller answers 429. The attempt counter lives on the stack of one
// `run` invocation, so nothing is shared between calls.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::warn;

use crate::error::Error;

/// Bounds for rate-limit retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before giving up with [`Error::RetriesExhausted`].
    pub max_attempts: u32,
    /// Delay used when the 429 response carries no usable `Retry-After`.
    pub default_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_delay: Duration::from_secs(30),
        }
    }
}

/// Re-invokes an operation while it fails with a rate-limit error.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitRetrier {
    policy: RetryPolicy,
}

impl RateLimitRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Backoff for `err`, or `None` if it should propagate immediately.
    pub fn delay_for(&self, err: &Error) -> Option<Duration> {
        err.rate_limit_delay(self.policy.default_delay)
    }

    /// Run `op` against `state`, retrying on rate limiting.
    ///
    /// `op` receives exclusive access to `state` for the duration of one
    /// attempt, which lets session-mutating attempts be retried without
    /// handing out overlapping borrows.
    pub async fn run<S, T, F>(&self, state: &mut S, mut op: F) -> Result<T, Error>
    where
        S: ?Sized + Send,
        F: for<'s> FnMut(&'s mut S) -> BoxFuture<'s, Result<T, Error>>,
    {
        let mut attempts = 0;
        loop {
            let err = match op(&mut *state).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let Some(delay) = self.delay_for(&err) else {
                return Err(err);
            };

            attempts += 1;
            if attempts >= self.policy.max_attempts {
                warn!(attempts, "rate limit retries exhausted");
                return Err(Error::RetriesExhausted { attempts });
            }

            warn!(
                attempt = attempts,
                delay_secs = delay.as_secs_f64(),
                "rate limited by controller, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::FutureExt;

    use super::*;

    fn fast() -> RateLimitRetrier {
        RateLimitRetrier::new(RetryPolicy {
            max_attempts: 3,
            default_delay: Duration::from_millis(1),
        })
    }

    #[test]
    fn retry_after_header_value_is_used() {
        let retrier = RateLimitRetrier::default();
        let err = Error::RateLimited {
            retry_after_secs: Some(5),
        };
        assert_eq!(retrier.delay_for(&err), Some(Duration::from_secs(5)));
    }

    #[test]
    fn missing_retry_after_falls_back_to_default() {
        let retrier = RateLimitRetrier::default();
        let err = Error::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(retrier.delay_for(&err), Some(Duration::from_secs(30)));
    }

    #[test]
    fn other_errors_are_not_retryable() {
        let retrier = RateLimitRetrier::default();
        let err = Error::Http {
            status: 404,
            body: String::new(),
        };
        assert_eq!(retrier.delay_for(&err), None);
    }

    #[tokio::test]
    async fn success_passes_through() {
        let mut calls = 0_u32;
        let result = fast()
            .run(&mut calls, |calls| {
                async move {
                    *calls += 1;
                    Ok::<_, Error>("done")
                }
                .boxed()
            })
            .await
            .unwrap();
        assert_eq!(result, "done");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn recovers_after_rate_limiting() {
        let mut calls = 0_u32;
        let result = fast()
            .run(&mut calls, |calls| {
                async move {
                    *calls += 1;
                    if *calls < 3 {
                        Err(Error::RateLimited {
                            retry_after_secs: None,
                        })
                    } else {
                        Ok(*calls)
                    }
                }
                .boxed()
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn gives_up_after_third_rate_limited_attempt() {
        let mut calls = 0_u32;
        let err = fast()
            .run(&mut calls, |calls| {
                async move {
                    *calls += 1;
                    Err::<(), _>(Error::RateLimited {
                        retry_after_secs: None,
                    })
                }
                .boxed()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3 }));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn other_failures_propagate_without_retry() {
        let mut calls = 0_u32;
        let err = fast()
            .run(&mut calls, |calls| {
                async move {
                    *calls += 1;
                    Err::<(), _>(Error::Http {
                        status: 500,
                        body: "boom".into(),
                    })
                }
                .boxed()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { status: 500, .. }));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_advertised_delay() {
        let retrier = RateLimitRetrier::default();
        let start = tokio::time::Instant::now();
        let mut calls = 0_u32;
        retrier
            .run(&mut calls, |calls| {
                async move {
                    *calls += 1;
                    if *calls == 1 {
                        Err(Error::RateLimited {
                            retry_after_secs: Some(5),
                        })
                    } else {
                        Ok(())
                    }
                }
                .boxed()
            })
            .await
            .unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5), "waited {waited:?}");
        assert!(waited < Duration::from_secs(6), "waited {waited:?}");
    }
}
