use anyhow::Result;
use log::warn;
use std::thread;
use std::time::Duration;

/// Fixed attempt count with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const IMAP: Self = Self {
        max_attempts: 3,
        delay: Duration::from_secs(5),
    };

    pub const INFERENCE: Self = Self {
        max_attempts: 5,
        delay: Duration::from_secs(15),
    };

    pub const SMTP: Self = Self {
        max_attempts: 3,
        delay: Duration::from_secs(5),
    };

    /// Same attempt count, no pause. Handy for tests and dry runs.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum Failure {
    /// Worth another try: connection refused, timeout, dropped session.
    Transient(anyhow::Error),
    /// Retrying will not help: bad address, error status from the server.
    Fatal(anyhow::Error),
}

impl Failure {
    pub fn transient(e: impl Into<anyhow::Error>) -> Self {
        Self::Transient(e.into())
    }

    pub fn fatal(e: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(e.into())
    }

    pub fn into_inner(self) -> anyhow::Error {
        match self {
            Self::Transient(e) | Self::Fatal(e) => e,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or runs out of attempts.
/// `op` receives the 1-based attempt number.
pub fn retry<T, F>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> std::result::Result<T, Failure>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(Failure::Fatal(e)) => return Err(e.context(format!("{what} failed"))),
            Err(Failure::Transient(e)) if attempt < attempts => {
                warn!(
                    "{what}: attempt {attempt}/{attempts} failed: {e:#}; retrying in {:?}",
                    policy.delay
                );
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
            Err(Failure::Transient(e)) => {
                return Err(e.context(format!("{what} failed after {attempts} attempts")));
            }
        }
    }
}
