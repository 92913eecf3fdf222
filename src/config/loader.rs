use std::fs;
use std::path::Path;

use regex::Regex;

use crate::config::types::Config;
use crate::error::ConfigError;

/// Tokens handed out by the Graph API: "IG" prefix, then an opaque tail.
const VALID_TOKEN_PATTERN: &str = "^IG[A-Za-z0-9_-]+$";

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Load and validate config from a JSON file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&raw)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate the port range and every account's token format.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    match config.port.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => {}
        _ => return Err(ConfigError::InvalidPort(config.port.clone())),
    }

    let token_pattern = Regex::new(VALID_TOKEN_PATTERN).expect("token pattern compiles");
    for (account_id, account) in &config.accounts {
        if !token_pattern.is_match(&account.token) {
            return Err(ConfigError::InvalidToken(account_id.clone()));
        }
    }

    Ok(())
}
