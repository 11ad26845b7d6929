//! Bounded retry for calls that fail while a new resource propagates.
//!
//! Creating a resource and being able to act on it are not atomic on the
//! provider: the create call returns before the resource is visible to every
//! API. Calls failing with one of the given provider error codes are retried
//! on a fixed poll interval until the time bound runs out; any other error is
//! returned after the first attempt.
//!
//! # Example
//!
//! ```ignore
//! use lbwire::reconcile::retry::{retry_on_codes, RetryPolicy};
//!
//! retry_on_codes(
//!     &RetryPolicy::default(),
//!     &[CODE_GROUP_NOT_FOUND],
//!     "tag_security_group",
//!     || client.create_security_group_tags(&id, &tags),
//! )
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use crate::cloud::CloudError;

/// Poll interval and time bound for [`retry_on_codes`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub poll_interval: Duration,
    /// Total time after which the last error is returned
    pub max_duration: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_duration: Duration::from_secs(5 * 60),
        }
    }
}

impl RetryPolicy {
    pub fn new(poll_interval: Duration, max_duration: Duration) -> Self {
        Self {
            poll_interval,
            max_duration,
        }
    }
}

/// Run `operation`, retrying while it fails with a code in `retryable_codes`.
///
/// Returns the operation's value, the first non-retryable error, or the last
/// retryable error once `policy.max_duration` has elapsed.
pub async fn retry_on_codes<F, Fut, T>(
    policy: &RetryPolicy,
    retryable_codes: &[&str],
    operation_name: &str,
    mut operation: F,
) -> Result<T, CloudError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CloudError>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let retryable = err
            .code()
            .is_some_and(|code| retryable_codes.contains(&code));
        if !retryable {
            return Err(err);
        }

        if started.elapsed() >= policy.max_duration {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %err,
                "Operation still failing after retry bound"
            );
            return Err(err);
        }

        warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %err,
            delay_ms = policy.poll_interval.as_millis(),
            "Operation failed, retrying"
        );

        tokio::time::sleep(policy.poll_interval).await;
    }
}
