// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::accounts::manager::TokenManager;
use crate::config::types::{AccountConfig, RefreshFreq, Settings};
use crate::error::RefreshError;
use crate::persist::ConfigStore;
use crate::refresh::client::{RefreshedToken, TokenRefresher};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn refreshed(token: &str) -> RefreshedToken {
    RefreshedToken {
        token: token.to_owned(),
        token_type: "bearer".to_owned(),
        permissions: String::new(),
        expires_in: 5_184_000,
    }
}

#[derive(Clone)]
pub enum Outcome {
    Succeed(String),
    FailUpstream,
}

/// Scripted refresher: pops one outcome per call, falling back to the last
/// configured behavior when the script runs dry. Records the call count and
/// the instant of every call so tests can assert attempt counts and backoff
/// spacing.
pub struct ScriptedRefresher {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    call_instants: Mutex<Vec<Instant>>,
}

impl ScriptedRefresher {
    fn with(script: Vec<Outcome>, fallback: Outcome, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            delay,
            calls: AtomicUsize::new(0),
            call_instants: Mutex::new(Vec::new()),
        })
    }

    pub fn always_succeeding(token: &str) -> Arc<Self> {
        Self::with(Vec::new(), Outcome::Succeed(token.to_owned()), None)
    }

    pub fn always_failing() -> Arc<Self> {
        Self::with(Vec::new(), Outcome::FailUpstream, None)
    }

    pub fn fail_n_then_succeed(n: usize, token: &str) -> Arc<Self> {
        Self::with(
            vec![Outcome::FailUpstream; n],
            Outcome::Succeed(token.to_owned()),
            None,
        )
    }

    /// Succeeds after holding every call open for `delay`; used to observe
    /// overlapping refreshes of independent accounts.
    pub fn slow_succeeding(token: &str, delay: Duration) -> Arc<Self> {
        Self::with(Vec::new(), Outcome::Succeed(token.to_owned()), Some(delay))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn call_instants(&self) -> Vec<Instant> {
        self.call_instants.lock().await.clone()
    }
}

#[async_trait]
impl TokenRefresher for ScriptedRefresher {
    async fn refresh(&self, _current_token: &str) -> Result<RefreshedToken, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_instants.lock().await.push(Instant::now());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match outcome {
            Outcome::Succeed(token) => Ok(refreshed(&token)),
            Outcome::FailUpstream => Err(RefreshError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
            }),
        }
    }
}

pub fn seed_accounts(entries: &[(&str, &str)]) -> HashMap<String, AccountConfig> {
    entries
        .iter()
        .map(|(id, token)| {
            (
                (*id).to_owned(),
                AccountConfig {
                    token: (*token).to_owned(),
                },
            )
        })
        .collect()
}

pub fn test_manager(
    refresher: Arc<dyn TokenRefresher>,
    config_path: &Path,
    freq: RefreshFreq,
    entries: &[(&str, &str)],
) -> Arc<TokenManager> {
    let settings = Settings {
        port: "8080".to_owned(),
        refresh_freq: freq,
    };
    Arc::new(TokenManager::new(
        settings,
        &seed_accounts(entries),
        refresher,
        ConfigStore::new(config_path),
    ))
}

/// Write an initial config file in the production layout.
pub fn write_config(path: &Path, port: &str, freq: &str, entries: &[(&str, &str)]) {
    let mut doc = serde_json::Map::new();
    doc.insert("port".to_owned(), json!(port));
    doc.insert("refresh_freq".to_owned(), json!(freq));
    for (id, token) in entries {
        doc.insert((*id).to_owned(), json!({ "token": token }));
    }
    std::fs::write(path, serde_json::Value::Object(doc).to_string()).expect("write config");
}

/// Poll until `check` passes; file writes and spawned refresh cycles settle
/// eventually rather than at an exact virtual instant.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
