//! Durable rewrite of the token state.
//!
//! The document written back has the same shape as the input config file,
//! with each account's token replaced by its latest confirmed value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::fs;
use tracing::debug;

use crate::accounts::record::Account;
use crate::config::types::{AccountConfig, Config, Settings};
use crate::error::PersistError;

/// Writes the live token set back to the config path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write settings plus every account's current token as one document.
    ///
    /// Each record is read under its own lock, so the snapshot never contains
    /// a half-updated token. The write goes to a unique temp file first and
    /// is renamed over the target; concurrent saves racing on one shared
    /// `.tmp` name could otherwise leave trailing bytes from a longer
    /// previous write.
    pub async fn persist(
        &self,
        settings: &Settings,
        accounts: &HashMap<String, Arc<Account>>,
    ) -> Result<(), PersistError> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let mut doc = Config {
            port: settings.port.clone(),
            refresh_freq: settings.refresh_freq,
            accounts: HashMap::new(),
        };
        for (id, account) in accounts {
            doc.accounts.insert(
                id.clone(),
                AccountConfig {
                    token: account.token().await,
                },
            );
        }

        let json = serde_json::to_string_pretty(&doc)?;

        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, json).await.map_err(|source| PersistError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| PersistError::Write {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), "token state persisted");
        Ok(())
    }
}
