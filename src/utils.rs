use crate::store::StoreError;
use chrono::{FixedOffset, NaiveDate, Utc};
use std::{future::Future, str::FromStr, time::Duration};

/// How often and how patiently transient storage faults are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently or runs out of attempts.
///
/// The wait between attempts grows linearly with the attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                log::warn!(
                    "Failed to {} (attempt {}/{}): {}",
                    what,
                    attempt,
                    policy.attempts,
                    e
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parses a stored setting. Unreadable values count as unset.
pub fn parse_setting<T: FromStr>(key: &str, raw: Option<&str>) -> Option<T> {
    let raw = raw?.trim();
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring malformed setting {}='{}'", key, raw);
            None
        }
    }
}

/// Calendar day at the given fixed offset, used to reset daily claims.
pub fn today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn transient_faults_are_retried() {
        let calls = AtomicU32::new(0);
        let result = retry(&instant(), "read", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&instant(), "write", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable(sqlx::Error::PoolClosed))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_faults_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&instant(), "write", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend(sqlx::Error::RowNotFound))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_settings_are_unset() {
        assert_eq!(parse_setting::<u32>("roll_cost", Some(" 15 ")), Some(15));
        assert_eq!(parse_setting::<u32>("roll_cost", Some("ten")), None);
        assert_eq!(parse_setting::<u32>("roll_cost", None), None);
    }
}
