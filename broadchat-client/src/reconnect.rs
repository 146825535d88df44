//! Fixed-delay reconnect policy for relay connections.
//!
//! Reconnection is a client-side concern, kept separate from the relay
//! server logic. The policy retries [`ChatClient::connect`] with a fixed
//! delay between attempts, either forever or up to a bounded attempt count.

use std::time::Duration;

use crate::client::{ChatClient, ClientError};

/// Retry policy: fixed delay between attempts, optionally bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between consecutive connection attempts.
    pub delay: Duration,
    /// Maximum number of attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Unbounded retry with a fixed delay between attempts.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Bounded retry: give up after `max_attempts` failed attempts.
    #[must_use]
    pub const fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }
}

impl Default for RetryPolicy {
    /// Retry every 3 seconds, without bound.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

/// Connect to a relay server, retrying per the given policy.
///
/// # Errors
///
/// Returns the last connection error once a bounded policy is exhausted.
/// With an unbounded policy this only returns `Ok`.
pub async fn connect_with_retry(url: &str, policy: &RetryPolicy) -> Result<ChatClient, ClientError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match ChatClient::connect(url).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                if let Some(max) = policy.max_attempts
                    && attempt >= max
                {
                    tracing::warn!(url, attempts = attempt, error = %e, "giving up on relay connection");
                    return Err(e);
                }
                tracing::info!(url, attempt, delay = ?policy.delay, error = %e, "retrying relay connection");
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
