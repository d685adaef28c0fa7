use lbc_core::{Error, Result};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long and how often to wait for a submission to reach a terminal status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let secs = (current.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Calls `check` until it yields a value or the policy's time budget runs out.
///
/// Sleeps between checks grow by `multiplier` up to `max_delay` and are
/// clipped to the remaining budget, so the last check happens at the
/// deadline and the timeout is never reported early.
pub fn poll_until<T>(
    policy: &PollPolicy,
    experiment_id: &str,
    mut check: impl FnMut(u32) -> Result<Option<T>>,
) -> Result<T> {
    let started = Instant::now();
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if let Some(done) = check(attempt)? {
            return Ok(done);
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(Error::Timeout {
                experiment_id: experiment_id.to_string(),
                timeout: policy.timeout,
            });
        }
        let pause = delay.min(policy.timeout - elapsed);
        debug!(
            experiment_id,
            attempt,
            pause_ms = pause.as_millis() as u64,
            "waiting before next poll"
        );
        thread::sleep(pause);
        delay = policy.next_delay(delay);
    }
}

/// Bounded retry for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(6);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Runs `op`, retrying only errors for which [`Error::is_retryable`] holds.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(Error::Transport(message)) if attempts > 1 => {
                    return Err(Error::Transport(format!(
                        "{} failed after {} attempts: {}",
                        what, attempts, message
                    )));
                }
                other => return other,
            }
        }
    }
}
