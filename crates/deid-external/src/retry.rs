use std::time::Duration;

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Call `op` until it succeeds or the policy is exhausted. On failure
/// returns the number of attempts made and the last error.
pub fn retry_with_backoff<T, E: std::fmt::Display>(
    policy: RetryPolicy,
    label: &str,
    mut op: impl FnMut() -> Result<T, E>,
    sleep: impl Fn(Duration),
) -> Result<T, (u32, E)> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempts <= policy.max_retries => {
                let delay = policy.delay(attempts);
                tracing::warn!(
                    operation = label,
                    attempt = attempts,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying"
                );
                sleep(delay);
            }
            Err(err) => return Err((attempts, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn gives_up_after_max_retries() {
        let slept = RefCell::new(Vec::new());
        let mut calls = 0;
        let result: Result<(), (u32, String)> = retry_with_backoff(
            RetryPolicy::default(),
            "put",
            || {
                calls += 1;
                Err("denied".to_string())
            },
            |delay| slept.borrow_mut().push(delay),
        );

        assert_eq!(result, Err((4, "denied".to_string())));
        assert_eq!(calls, 4);
        assert_eq!(
            slept.into_inner(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn recovers_on_retry() {
        let mut calls = 0;
        let result: Result<u32, (u32, String)> = retry_with_backoff(
            RetryPolicy::default(),
            "put",
            || {
                calls += 1;
                if calls < 3 { Err("flaky".to_string()) } else { Ok(calls) }
            },
            |_| {},
        );
        assert_eq!(result, Ok(3));
    }
}
