use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::accounts::record::Account;
use crate::config::types::{AccountConfig, Settings};
use crate::error::ManagerError;
use crate::observability::metrics::get_metrics;
use crate::persist::ConfigStore;
use crate::refresh::client::TokenRefresher;
use crate::refresh::retry::{attempt_refresh, refresh_with_retry};
use crate::scheduler::{AccountTimer, SchedulerTimings};

/// Overall bound on graceful shutdown: timer cancellation, the final state
/// flush and connection draining must all fit inside it.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type AccountMap = HashMap<String, Arc<Account>>;

/// Orchestrates all accounts: owns the account map, arms the per-account
/// refresh timers and coordinates shutdown.
///
/// Locking: the map lock is coarse and only guards structural access
/// (lookup-by-name, iteration for persistence); each record carries its own
/// lock for field mutation. The coarse lock is never acquired while a record
/// lock is held.
pub struct TokenManager {
    accounts: Arc<RwLock<AccountMap>>,
    settings: Settings,
    refresher: Arc<dyn TokenRefresher>,
    store: ConfigStore,
    timings: SchedulerTimings,
    timers: Mutex<HashMap<String, AccountTimer>>,
    shutdown: CancellationToken,
}

impl TokenManager {
    /// Build the account map from seed data. Does not start timers.
    pub fn new(
        settings: Settings,
        seed: &HashMap<String, AccountConfig>,
        refresher: Arc<dyn TokenRefresher>,
        store: ConfigStore,
    ) -> Self {
        Self::with_timings(settings, seed, refresher, store, SchedulerTimings::default())
    }

    pub fn with_timings(
        settings: Settings,
        seed: &HashMap<String, AccountConfig>,
        refresher: Arc<dyn TokenRefresher>,
        store: ConfigStore,
        timings: SchedulerTimings,
    ) -> Self {
        let accounts = seed
            .iter()
            .map(|(id, account)| {
                (
                    id.clone(),
                    Arc::new(Account::new(id.clone(), account.token.clone())),
                )
            })
            .collect();

        Self {
            accounts: Arc::new(RwLock::new(accounts)),
            settings,
            refresher,
            store,
            timings,
            timers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Token fired when shutdown begins; the HTTP server drains on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn account(&self, account_id: &str) -> Result<Arc<Account>, ManagerError> {
        self.accounts
            .read()
            .await
            .get(account_id)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(account_id.to_owned()))
    }

    /// Current token for an account.
    pub async fn lookup_token(&self, account_id: &str) -> Result<String, ManagerError> {
        let account = self.account(account_id).await?;
        Ok(account.token().await)
    }

    /// Arm one repeating refresh timer per account. Re-arming an account
    /// cancels and replaces its existing timer.
    pub async fn start_scheduled_refreshes(&self) {
        let accounts: Vec<Arc<Account>> = self.accounts.read().await.values().cloned().collect();

        let mut timers = self.timers.lock().await;
        for account in accounts {
            let accounts_map = Arc::clone(&self.accounts);
            let settings = self.settings.clone();
            let store = self.store.clone();
            let refresher = Arc::clone(&self.refresher);
            let retry = self.timings.retry.clone();

            let timer = AccountTimer::arm(
                Arc::clone(&account),
                self.settings.refresh_freq,
                self.timings.clone(),
                &self.shutdown,
                move |account, cancel| {
                    let accounts_map = Arc::clone(&accounts_map);
                    let settings = settings.clone();
                    let store = store.clone();
                    let refresher = Arc::clone(&refresher);
                    let retry = retry.clone();
                    async move {
                        refresh_with_retry(&retry, &account, refresher.as_ref(), &cancel)
                            .await?;
                        flush_to_store(&store, &settings, &accounts_map).await;
                        Ok(())
                    }
                },
            );
            if let Some(previous) = timers.insert(account.id.clone(), timer) {
                previous.cancel();
            }
        }

        info!(
            accounts = timers.len(),
            "Individual refresh timers set up for all accounts"
        );
    }

    /// One synchronous refresh attempt outside the schedule, bypassing the
    /// retry loop. Unknown accounts fail before any network call.
    pub async fn manual_refresh(&self, account_id: &str) -> Result<(), ManagerError> {
        let account = self.account(account_id).await?;
        attempt_refresh(&account, self.refresher.as_ref()).await?;
        self.flush().await;
        Ok(())
    }

    /// Best-effort write of the current token set; memory stays
    /// authoritative when it fails and the next refresh or shutdown retries.
    pub async fn flush(&self) {
        flush_to_store(&self.store, &self.settings, &self.accounts).await;
    }

    /// Stop every refresh timer and flush the final state. The caller bounds
    /// the whole sequence (including HTTP draining) with [`SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(&self) {
        info!("stopping refresh timers");
        self.shutdown.cancel();
        let mut timers = self.timers.lock().await;
        for (_, timer) in timers.drain() {
            timer.cancel();
        }
        drop(timers);

        self.flush().await;
    }
}

async fn flush_to_store(store: &ConfigStore, settings: &Settings, accounts: &RwLock<AccountMap>) {
    let accounts = accounts.read().await;
    if let Err(e) = store.persist(settings, &accounts).await {
        get_metrics().await.persist_failures.inc();
        error!("Failed to save updated token state: {e}");
    }
}
