//! Per-account repeating refresh timers.
//!
//! Each account gets one spawned task looping sleep -> refresh cycle ->
//! reschedule, instead of a callback that re-arms itself. Cancellation is a
//! token checked while idle and threaded into the running cycle, which keeps
//! shutdown and virtual-clock testing tractable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::accounts::record::Account;
use crate::config::types::RefreshFreq;
use crate::error::RefreshError;
use crate::refresh::retry::RetryPolicy;

/// Wall-clock knobs for the refresh loop, injectable for tests.
#[derive(Debug, Clone)]
pub struct SchedulerTimings {
    /// Delay unit multiplied by `retry_count + 1` when a cycle exhausts its
    /// retries.
    pub reschedule_unit: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerTimings {
    fn default() -> Self {
        Self {
            reschedule_unit: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle to one account's repeating refresh task.
///
/// States per account: idle (sleeping) -> refreshing (cycle running) -> idle,
/// with an extended delay after a cycle that exhausted its retries.
/// Cancelling stops the loop with no further firings; a cycle already in
/// flight sees the same token and aborts through the retry loop.
pub struct AccountTimer {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl AccountTimer {
    /// Arm the repeating cycle for one account.
    ///
    /// `run_cycle` performs one full refresh (retry loop plus persistence).
    /// On success the next firing is one frequency interval away; on failure
    /// it is `(retry_count + 1)` reschedule units, capped at the frequency
    /// interval so the delay never outgrows the normal schedule.
    pub fn arm<F, Fut>(
        account: Arc<Account>,
        freq: RefreshFreq,
        timings: SchedulerTimings,
        shutdown: &CancellationToken,
        run_cycle: F,
    ) -> Self
    where
        F: Fn(Arc<Account>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RefreshError>> + Send + 'static,
    {
        let cancel = shutdown.child_token();
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut delay = freq.interval();
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = sleep(delay) => {}
                }

                match run_cycle(account.clone(), loop_cancel.clone()).await {
                    Ok(()) => {
                        delay = freq.interval();
                    }
                    Err(RefreshError::Cancelled) => break,
                    Err(e) => {
                        let streak = account.retry_count().await;
                        delay = (timings.reschedule_unit * (streak + 1)).min(freq.interval());
                        error!(
                            account = %account.id,
                            streak,
                            next_attempt_secs = delay.as_secs(),
                            "Error refreshing token: {e}"
                        );
                    }
                }
            }
            debug!(account = %account.id, "refresh timer stopped");
        });

        Self {
            cancel,
            _handle: handle,
        }
    }

    /// Stop the timer. The task exits at its next idle point; a cycle in
    /// flight aborts through its cancellation token.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
