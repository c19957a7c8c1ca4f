//! Bounded, cancellable progress polling with exponential backoff.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ecomops_api::{ApiError, FailureClass, RetryPolicy, classify_api_error};
use rand::Rng;
use tracing::{debug, info, warn};

const SLEEP_SLICE_MS: u64 = 50;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Waits between polls.
pub trait Sleeper: Send + Sync {
    /// Waits up to `ms` milliseconds, returning early when `cancel` fires.
    fn sleep(&self, ms: u64, cancel: &CancellationToken);
}

/// Real-time sleeper that wakes periodically to observe cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, ms: u64, cancel: &CancellationToken) {
        let mut remaining = ms;
        while remaining > 0 && !cancel.is_cancelled() {
            let slice = remaining.min(SLEEP_SLICE_MS);
            thread::sleep(Duration::from_millis(slice));
            remaining -= slice;
        }
    }
}

/// Sleeper that records requested delays without waiting.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<u64>>,
    cancel_after: Option<usize>,
}

impl RecordingSleeper {
    /// Records every delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token on the `count`-th sleep.
    pub fn cancelling_after(count: usize) -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            cancel_after: Some(count),
        }
    }

    /// Delays requested so far.
    pub fn delays(&self) -> Vec<u64> {
        self.delays
            .lock()
            .map(|delays| delays.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, ms: u64, cancel: &CancellationToken) {
        let count = match self.delays.lock() {
            Ok(mut delays) => {
                delays.push(ms);
                delays.len()
            }
            Err(_) => return,
        };
        if self.cancel_after == Some(count) {
            cancel.cancel();
        }
    }
}

/// Polling limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between successful polls.
    pub interval_ms: u64,
    /// Upper bound on requests issued.
    pub max_polls: u32,
    /// Backoff applied after failed polls.
    pub retry: RetryPolicy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            max_polls: 200,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Job still running.
    Pending,
    /// Job reached a terminal state.
    Done(T),
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Terminal state observed.
    Finished(T),
    /// Cancellation requested.
    Cancelled,
    /// `max_polls` requests issued without a terminal state.
    Exhausted {
        /// Requests issued.
        polls: u32,
    },
    /// Too many consecutive retriable failures.
    GaveUp {
        /// Consecutive failures observed.
        failures: u32,
        /// Last error message.
        last_error: String,
    },
    /// Token rejected.
    Unauthorized,
    /// Non-retriable failure.
    Failed(String),
}

/// Drives a poll closure until it reports a terminal state or a limit hits.
pub struct ProgressPoller {
    policy: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ProgressPoller {
    /// Creates a poller.
    pub fn new(policy: PollPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// Active limits.
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Polls `tick` until done, using the thread-local RNG for jitter.
    pub fn run<T, F>(&self, job: &str, cancel: &CancellationToken, tick: F) -> PollOutcome<T>
    where
        F: FnMut() -> Result<PollStep<T>, ApiError>,
    {
        self.run_with_rng(job, cancel, &mut rand::rng(), tick)
    }

    /// Polls `tick` until done, drawing jitter from `rng`.
    ///
    /// Successful polls wait `interval_ms`. A retriable failure waits the
    /// backoff delay for its position in the current failure streak; the
    /// streak resets after any success. Unauthorized and permanent failures
    /// end the run at once.
    pub fn run_with_rng<T, F, R>(
        &self,
        job: &str,
        cancel: &CancellationToken,
        rng: &mut R,
        mut tick: F,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Result<PollStep<T>, ApiError>,
        R: Rng + ?Sized,
    {
        let mut polls = 0_u32;
        let mut failures = 0_u32;

        loop {
            if cancel.is_cancelled() {
                info!(stage = "poll", action = "cancelled", job, polls);
                return PollOutcome::Cancelled;
            }
            if polls >= self.policy.max_polls {
                warn!(stage = "poll", action = "exhausted", job, polls);
                return PollOutcome::Exhausted { polls };
            }
            polls += 1;

            let delay = match tick() {
                Ok(PollStep::Done(value)) => {
                    info!(stage = "poll", action = "finished", job, polls);
                    return PollOutcome::Finished(value);
                }
                Ok(PollStep::Pending) => {
                    failures = 0;
                    debug!(stage = "poll", action = "pending", job, polls);
                    self.policy.interval_ms
                }
                Err(error) => match classify_api_error(&error) {
                    FailureClass::Unauthorized => {
                        warn!(stage = "poll", action = "unauthorized", job, polls);
                        return PollOutcome::Unauthorized;
                    }
                    FailureClass::Permanent => {
                        warn!(stage = "poll", action = "failed", job, polls, %error);
                        return PollOutcome::Failed(error.to_string());
                    }
                    FailureClass::Retriable => {
                        failures += 1;
                        if !self.policy.retry.allows_retry(failures) {
                            warn!(stage = "poll", action = "gave_up", job, failures, %error);
                            return PollOutcome::GaveUp {
                                failures,
                                last_error: error.to_string(),
                            };
                        }
                        let delay = self.policy.retry.delay_for_attempt(failures - 1, rng);
                        warn!(stage = "poll", action = "retry", job, failures, delay_ms = delay, %error);
                        delay
                    }
                },
            };

            self.sleeper.sleep(delay, cancel);
        }
    }
}
