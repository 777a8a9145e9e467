use crate::reaper::{ReaperConfig, MIN_BATCH_SIZE};
use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./links.db"
    pub database_url: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// How long in-flight requests get to finish once shutdown starts
    pub shutdown_timeout: Duration,

    /// Minutes between cache sweeps. 0 disables the reaper.
    pub clean_interval_minutes: u64,

    /// Most codes a single sweep evicts. Never below [`MIN_BATCH_SIZE`].
    pub clean_batch_size: usize,

    /// Seed for the murmur3 hash behind generated codes
    pub hash_seed: u32,

    /// Initial capacity of the in-memory link cache
    pub cache_capacity: usize,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key -> value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let shutdown_secs: u64 = parse_or(&lookup, "SHUTDOWN_TIMEOUT", 5)?;

        let clean_batch_size: usize = parse_or(&lookup, "CLEAN_BATCH_SIZE", 1024)?;
        if clean_batch_size < MIN_BATCH_SIZE {
            tracing::warn!(
                "CLEAN_BATCH_SIZE={} is below the minimum, using {}",
                clean_batch_size,
                MIN_BATCH_SIZE
            );
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:./links.db".into()),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "PORT", 80)?,
            shutdown_timeout: Duration::from_secs(if shutdown_secs == 0 { 5 } else { shutdown_secs }),
            clean_interval_minutes: parse_or(&lookup, "CLEAN_INTERVAL", 60)?,
            clean_batch_size: clean_batch_size.max(MIN_BATCH_SIZE),
            hash_seed: parse_or(&lookup, "HASH_SEED", 0)?,
            cache_capacity: parse_or(&lookup, "CACHE_INITIALIZATION_SIZE", 8)?,
        })
    }

    /// Reaper settings, or `None` when sweeping is disabled.
    pub fn reaper(&self) -> Option<ReaperConfig> {
        if self.clean_interval_minutes == 0 {
            return None;
        }
        Some(ReaperConfig {
            interval: Duration::from_secs(self.clean_interval_minutes * 60),
            batch_size: self.clean_batch_size,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        _ => Ok(default),
    }
}
