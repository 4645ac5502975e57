//! Retrying operations that lost a race for the database write lock

use std::thread::sleep;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total tries, including the first
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Wait before the first retry, doubled before each later one
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Run `op`, trying again while it fails with `StoreBusy`
///
/// Any other error, or running out of attempts, returns the last error.
/// `op` must be safe to repeat: a busy error means its transaction never
/// committed.
pub fn on_conflict<T, F>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = Duration::from_millis(policy.backoff_ms);
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < policy.attempts => {
                warn!(
                    "{err}, retry {attempt}/{} in {}ms",
                    policy.attempts - 1,
                    backoff.as_millis()
                );
                sleep(backoff);
                backoff *= 2;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}
