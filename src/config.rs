use std::time::Duration;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::storage::{repository, Database};
use crate::window::Window;

pub const KEY_WINDOW_DAYS: &str = "window_days";
pub const KEY_MAX_GAP_DAYS: &str = "max_gap_days";
pub const KEY_CACHE_TTL_SECS: &str = "cache_ttl_secs";

/// Tunables for the ledger and its sync worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How far back the default window reaches.
    pub window_days: u32,
    /// Gaps longer than this are fetched in pieces.
    pub max_gap_days: u32,
    /// How long list reads may be served from cache.
    pub cache_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            max_gap_days: 30,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

/// Longest accepted cache lifetime.
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn parse_window_days(raw: &str) -> Result<u32> {
    let days = parse_setting(KEY_WINDOW_DAYS, raw)?;
    Window::Rolling(days)
        .to_range(Utc::now())
        .map_err(|e| Error::Config(format!("{KEY_WINDOW_DAYS} = {days} is unusable: {e}")))?;
    Ok(days)
}

fn parse_cache_ttl(raw: &str) -> Result<Duration> {
    let secs: u64 = parse_setting(KEY_CACHE_TTL_SECS, raw)?;
    if secs > MAX_CACHE_TTL_SECS {
        return Err(Error::Config(format!(
            "{KEY_CACHE_TTL_SECS} must be at most {MAX_CACHE_TTL_SECS}, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

impl LedgerConfig {
    /// Defaults overlaid with whatever `app_config` holds.
    pub async fn load(db: &Database) -> Result<Self> {
        let settings = db.reader().call(|conn| repository::list_config(conn)).await?;

        let mut config = Self::default();
        for (key, value) in &settings {
            match key.as_str() {
                KEY_WINDOW_DAYS => config.window_days = parse_window_days(value)?,
                KEY_MAX_GAP_DAYS => config.max_gap_days = parse_setting(key, value)?,
                KEY_CACHE_TTL_SECS => config.cache_ttl = parse_cache_ttl(value)?,
                _ => {}
            }
        }
        log::debug!("loaded config: {config:?}");
        Ok(config)
    }

    /// Check a value before it is stored under one of the known keys. Uses
    /// the same rules as [`load`](Self::load), so a stored value never
    /// breaks the next open.
    pub fn validate_setting(key: &str, value: &str) -> Result<()> {
        match key {
            KEY_WINDOW_DAYS => parse_window_days(value).map(|_| ()),
            KEY_MAX_GAP_DAYS => parse_setting::<u32>(key, value).map(|_| ()),
            KEY_CACHE_TTL_SECS => parse_cache_ttl(value).map(|_| ()),
            _ => Ok(()),
        }
    }

    pub fn max_gap(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_gap_days as i64)
    }
}
