use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cgminer::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::tracing::prelude::*;

#[derive(Debug, Clone)]
pub struct DashConfig {
    /// CGMiner API port on the miner.
    pub miner_port: u16,

    /// Budget for one command exchange, connect included. Every poll step
    /// can take this long, so a full poll of a dead miner blocks for up to
    /// four times this value.
    pub command_timeout: Duration,

    /// Delay between background polls.
    pub poll_interval: Duration,

    /// JSON file holding persisted settings.
    pub store_path: PathBuf,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            miner_port: DEFAULT_PORT,
            command_timeout: DEFAULT_TIMEOUT,
            poll_interval: Duration::from_secs(10),
            store_path: PathBuf::from("kon8-dash.json"),
        }
    }
}

impl DashConfig {
    /// Defaults, overridden by `KON8_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "KON8_MINER_PORT") {
            config.miner_port = port;
        }
        if let Some(ms) = parse_nonzero(&lookup, "KON8_COMMAND_TIMEOUT_MS") {
            config.command_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_nonzero(&lookup, "KON8_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("KON8_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring unparseable setting");
            None
        }
    }
}

/// Like [`parse_var`], but a zero period is refused: a zero timeout fails
/// every command and a zero poll interval cannot drive a ticker.
fn parse_nonzero(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    match parse_var(lookup, key)? {
        0 => {
            warn!(key, value = 0, "Ignoring unparseable setting");
            None
        }
        value => Some(value),
    }
}
