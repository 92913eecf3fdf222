use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::accounts::record::Account;
use crate::error::RefreshError;
use crate::observability::metrics::get_metrics;
use crate::refresh::client::{RefreshedToken, TokenRefresher};

/// Backoff policy for the scheduled refresh path.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Wait before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound for the doubling backoff.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// One observed exchange: call upstream with the record's current token and
/// install the result on success.
pub(crate) async fn attempt_refresh(
    account: &Account,
    refresher: &dyn TokenRefresher,
) -> Result<RefreshedToken, RefreshError> {
    let metrics = get_metrics().await;
    metrics
        .refresh_attempts
        .with_label_values(&[account.id.as_str()])
        .inc();

    let start = Instant::now();
    let current = account.token().await;
    match refresher.refresh(&current).await {
        Ok(refreshed) => {
            metrics
                .refresh_duration
                .with_label_values(&[account.id.as_str()])
                .observe(start.elapsed().as_secs_f64());
            account.apply_refreshed(refreshed.token.clone()).await;
            info!(account = %account.id, "Token successfully refreshed");
            Ok(refreshed)
        }
        Err(e) => {
            metrics
                .refresh_failures
                .with_label_values(&[account.id.as_str(), e.reason()])
                .inc();
            Err(e)
        }
    }
}

/// Refresh with bounded exponential backoff.
///
/// Attempts for one account are strictly sequential. Every failed attempt
/// bumps the record's retry counter; the counter resets only when an attempt
/// succeeds, so after exhaustion it still reflects the streak length. A
/// fired `cancel` token aborts the loop between attempts or mid-wait with
/// [`RefreshError::Cancelled`].
pub async fn refresh_with_retry(
    policy: &RetryPolicy,
    account: &Account,
    refresher: &dyn TokenRefresher,
    cancel: &CancellationToken,
) -> Result<RefreshedToken, RefreshError> {
    let mut delay = policy.base_delay;

    for attempt in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return Err(RefreshError::Cancelled);
        }

        match attempt_refresh(account, refresher).await {
            Ok(refreshed) => return Ok(refreshed),
            Err(e) => {
                let streak = account.record_failure().await;
                if attempt == policy.attempts {
                    error!(account = %account.id, "Maximum retry attempts reached: {e}");
                    return Err(RefreshError::MaxRetriesExceeded {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                warn!(account = %account.id, attempt, streak, "refresh attempt failed: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RefreshError::Cancelled),
                    _ = sleep(delay) => {}
                }
                delay = (delay * 2).min(policy.max_delay);
            }
        }
    }

    unreachable!("retry loop exhausted unexpectedly")
}
