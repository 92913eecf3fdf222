use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RefreshError;

pub const GRAPH_API_BASE: &str = "https://graph.instagram.com";

/// Upstream exchange requests are short; anything slower is treated as a
/// network failure and retried.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Successful exchange payload from the refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    #[serde(rename = "access_token")]
    pub token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub expires_in: i64,
}

/// One upstream token exchange. Implementations are stateless aside from the
/// bounded request timeout and never touch shared state, so the retry loop
/// and scheduler can call them freely.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, current_token: &str) -> Result<RefreshedToken, RefreshError>;
}

/// Production refresher backed by the Instagram Graph API.
#[derive(Debug, Clone)]
pub struct GraphApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphApiClient {
    pub fn new() -> Self {
        Self::with_base_url(GRAPH_API_BASE)
    }

    /// Point the client at an alternative endpoint (tests use a local mock).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl Default for GraphApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenRefresher for GraphApiClient {
    async fn refresh(&self, current_token: &str) -> Result<RefreshedToken, RefreshError> {
        let url = format!("{}/refresh_access_token", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "ig_refresh_token"),
                ("access_token", current_token),
            ])
            .send()
            .await
            .map_err(RefreshError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Upstream { status });
        }

        let body = response.text().await.map_err(RefreshError::Network)?;
        serde_json::from_str(&body).map_err(RefreshError::Decode)
    }
}
