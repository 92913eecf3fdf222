use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Mutable refresh state of one account, guarded by the record's own lock so
/// unrelated accounts never contend.
#[derive(Debug)]
struct AccountState {
    token: String,
    last_refresh: Option<DateTime<Utc>>,
    retry_count: u32,
}

/// One account's live record.
///
/// The token field only ever holds the config-loaded value or the value most
/// recently confirmed by a successful exchange. Readers take the record's
/// read lock, so a lookup during an in-flight refresh observes either the
/// pre-refresh or post-refresh token, never a torn value.
#[derive(Debug)]
pub struct Account {
    pub id: String,
    state: RwLock<AccountState>,
}

impl Account {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(AccountState {
                token: token.into(),
                last_refresh: None,
                retry_count: 0,
            }),
        }
    }

    pub async fn token(&self) -> String {
        self.state.read().await.token.clone()
    }

    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refresh
    }

    /// Length of the current failure streak.
    pub async fn retry_count(&self) -> u32 {
        self.state.read().await.retry_count
    }

    /// Install a freshly confirmed token and clear the failure streak.
    pub async fn apply_refreshed(&self, token: String) {
        let mut state = self.state.write().await;
        state.token = token;
        state.last_refresh = Some(Utc::now());
        state.retry_count = 0;
    }

    /// Record one failed refresh attempt; returns the new streak length.
    pub async fn record_failure(&self) -> u32 {
        let mut state = self.state.write().await;
        state.retry_count += 1;
        state.retry_count
    }
}
