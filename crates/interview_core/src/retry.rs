//! crates/interview_core/src/retry.rs
//!
//! Bounded retry for connection-style failures.

use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

use crate::ports::{PortError, PortResult};

pub const USER_ABORT_REASON: &str = "User-Initiated Abort";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Recoverable,
    UserAbort,
    Fatal,
}

fn recoverable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)network|time(d)?\s?out|connection|websocket|temporar")
            .expect("static pattern compiles")
    })
}

pub fn classify_message(message: &str) -> ErrorClass {
    if message.contains(USER_ABORT_REASON) {
        ErrorClass::UserAbort
    } else if recoverable_pattern().is_match(message) {
        ErrorClass::Recoverable
    } else {
        ErrorClass::Fatal
    }
}

pub fn classify_error(error: &PortError) -> ErrorClass {
    match error {
        PortError::NotFound(_)
        | PortError::InvalidInput(_)
        | PortError::Configuration(_)
        | PortError::Unauthorized => ErrorClass::Fatal,
        PortError::Upstream { status, message } => {
            if *status >= 500 || *status == 429 {
                match classify_message(message) {
                    ErrorClass::UserAbort => ErrorClass::UserAbort,
                    _ => ErrorClass::Recoverable,
                }
            } else {
                classify_message(message)
            }
        }
        PortError::Unexpected(message) => classify_message(message),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails fatally, or the retries run out.
    /// `op` receives the zero-based attempt number.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> PortResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if classify_error(&err) != ErrorClass::Recoverable {
                return Err(err);
            }
            if attempt >= self.max_retries {
                return Err(PortError::Unexpected(format!(
                    "Connection failed after maximum retries: {err}"
                )));
            }

            attempt += 1;
            warn!(
                attempt,
                max_retries = self.max_retries,
                error = %err,
                "Recoverable failure, retrying"
            );
            tokio::time::sleep(self.delay).await;
        }
    }
}
