use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// ================================
/// Full config file document
/// ================================
///
/// Accounts are the remaining top-level keys, each holding a `token` entry:
///
/// ```json
/// {
///   "port": "8080",
///   "refresh_freq": "daily",
///   "my_account": { "token": "IGabc123" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: String,
    pub refresh_freq: RefreshFreq,
    #[serde(flatten)]
    pub accounts: HashMap<String, AccountConfig>,
}

impl Config {
    /// Static service settings, immutable after load.
    pub fn settings(&self) -> Settings {
        Settings {
            port: self.port.clone(),
            refresh_freq: self.refresh_freq,
        }
    }
}

/// One account entry in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub token: String,
}

/// ================================
/// Refresh frequency
/// ================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshFreq {
    Daily,
    Weekly,
    Monthly,
    /// Compressed cycle for accelerated runs.
    Test,
}

impl RefreshFreq {
    /// Delay between successful refreshes of one account.
    pub fn interval(&self) -> Duration {
        match self {
            RefreshFreq::Daily => Duration::from_secs(24 * 60 * 60),
            RefreshFreq::Weekly => Duration::from_secs(7 * 24 * 60 * 60),
            RefreshFreq::Monthly => Duration::from_secs(30 * 24 * 60 * 60),
            RefreshFreq::Test => Duration::from_secs(60),
        }
    }
}

/// Settings shared by the manager, scheduler and persistence writer.
#[derive(Debug, Clone)]
pub struct Settings {
    /// String-encoded listen port, validated 1-65535 at load.
    pub port: String,
    pub refresh_freq: RefreshFreq,
}
