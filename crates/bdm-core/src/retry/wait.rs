//! Bounded polling wait for out-of-band transfers.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// `ready` reported true before the window ended.
    Satisfied,
    /// The window ran out.
    Elapsed,
    Cancelled,
}

/// Wait up to `window`, calling `ready` every `poll` and returning early once it
/// holds. Cancellation ends the wait immediately.
pub async fn wait_window<F, Fut>(
    window: Duration,
    poll: Duration,
    cancel: &CancellationToken,
    mut ready: F,
) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if cancel.is_cancelled() {
        return WaitOutcome::Cancelled;
    }
    if window.is_zero() {
        return WaitOutcome::Elapsed;
    }
    let deadline = Instant::now() + window;
    let poll = if poll.is_zero() { window } else { poll };
    loop {
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::Elapsed;
        }
        let step = poll.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
            _ = tokio::time::sleep(step) => {}
        }
        if ready().await {
            return WaitOutcome::Satisfied;
        }
    }
}
