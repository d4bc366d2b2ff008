use std::time::Duration;

use crate::config::BatchConfig;

/// Per-item lifecycle inside one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Enqueued,
    Validating,
    Completed,
    RetryPending,
    PermanentlyFailed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Completed | ItemState::PermanentlyFailed)
    }
}

/// What happened to an item, fed into [`ItemState::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    /// The wait window ended; the folder is about to be checked.
    WaitOver,
    Valid,
    /// Validation failed; `attempts` is the count after recording this failure.
    Invalid { attempts: u32 },
    /// Missing assets were handed back to the agent.
    Reenqueued,
}

impl ItemState {
    /// Next state, or `None` if the event does not apply in this state.
    pub fn on(self, event: ItemEvent, policy: &RetryPolicy) -> Option<ItemState> {
        use ItemEvent::*;
        use ItemState::*;
        match (self, event) {
            (Enqueued, WaitOver) => Some(Validating),
            (Validating, Valid) => Some(Completed),
            (Validating, Invalid { attempts }) => Some(if policy.exhausted(attempts) {
                PermanentlyFailed
            } else {
                RetryPending
            }),
            (RetryPending, Reenqueued) => Some(Enqueued),
            _ => None,
        }
    }
}

/// Attempt budget and wait windows for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed validation cycles before an item is quarantined.
    pub max_attempts: u32,
    /// Wait after the first enqueue.
    pub initial_wait: Duration,
    /// Wait after re-enqueuing missing assets.
    pub retry_wait: Duration,
    /// Readiness poll interval inside a wait.
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for RetryPolicy {
    fn from(cfg: &BatchConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_wait: secs(cfg.initial_wait_secs),
            retry_wait: secs(cfg.retry_wait_secs),
            poll_interval: secs(cfg.poll_interval_secs),
        }
    }
}

fn secs(v: f64) -> Duration {
    if v.is_finite() && v > 0.0 {
        Duration::from_secs_f64(v)
    } else {
        Duration::ZERO
    }
}

impl RetryPolicy {
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Window to wait before validation round `round` (0-based).
    pub fn wait_for_round(&self, round: u32) -> Duration {
        if round == 0 {
            self.initial_wait
        } else {
            self.retry_wait
        }
    }

    /// A policy with no waiting at all (dry runs).
    pub fn without_waits(mut self) -> Self {
        self.initial_wait = Duration::ZERO;
        self.retry_wait = Duration::ZERO;
        self
    }
}
