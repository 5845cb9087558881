//! Bounded retry with exponential backoff for provider HTTP calls

use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::Error;

/// Longest wait between two attempts
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Failure of a single attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Transport failure, throttling or server error; worth another attempt
    Retryable(Error),
    /// Anything else; returned immediately
    Fatal(Error),
}

impl AttemptError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, error: Error) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            AttemptError::Retryable(error)
        } else {
            AttemptError::Fatal(error)
        }
    }

    fn into_inner(self) -> Error {
        match self {
            AttemptError::Retryable(e) | AttemptError::Fatal(e) => e,
        }
    }
}

/// Retry policy shared by the provider clients
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Backoff before retry number `attempt + 1`, capped at [`MAX_DELAY`]
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_DELAY)
    }

    /// Run `operation` until it succeeds, fails fatally or runs out of retries
    pub async fn run<F, Fut, T>(&self, what: &str, operation: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(AttemptError::Retryable(e)) if attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        what,
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into_inner()),
            }
        }
    }
}
