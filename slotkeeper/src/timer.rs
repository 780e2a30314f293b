//! One-shot, cancellable timers on the tokio runtime.
//!
//! Cancellation is best effort: once the delay has elapsed and the callback has
//! started, [`TimerService::cancel`] has no effect. Callbacks must therefore carry
//! their own guard against acting twice.

use std::time::Duration;

use tokio::task::AbortHandle;

/// Handle to a scheduled callback. Dropping it does not cancel the timer.
#[derive(Debug)]
pub struct TimerHandle {
    abort_handle: AbortHandle,
}

/// Schedules callbacks to run once after a delay.
#[derive(Debug, Clone, Default)]
pub struct TimerService;

impl TimerService {
    pub fn new() -> Self {
        Self
    }

    /// Run `callback` once after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });

        TimerHandle {
            abort_handle: task.abort_handle(),
        }
    }

    /// Cancel a pending timer. No-op if the callback already ran or is running.
    pub fn cancel(&self, handle: TimerHandle) {
        handle.abort_handle.abort();
    }
}
