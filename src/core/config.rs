/// Runtime configuration from environment variables
///
/// The backup container is configured entirely through its environment (and
/// a .env file loaded at startup), since the spawned backup process inherits
/// exactly that environment.

use anyhow::{anyhow, Result};

use crate::core::restic::RetentionPolicy;

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    /// Restic repository reference, passed to every restic invocation.
    pub repository: String,
    pub log_level: String,
    pub retention: RetentionPolicy,
    /// Generic JSON webhook for alerts.
    pub alert_webhook_url: Option<String>,
    /// Discord-compatible webhook for alerts.
    pub discord_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let repository = lookup("RESTIC_REPOSITORY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("RESTIC_REPOSITORY is not set"))?;

        if lookup("RESTIC_PASSWORD").filter(|v| !v.is_empty()).is_none() {
            return Err(anyhow!("RESTIC_PASSWORD is not set"));
        }

        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            repository,
            log_level: get_or("LOG_LEVEL", DEFAULT_LOG_LEVEL),
            retention: RetentionPolicy {
                keep_daily: get_or("KEEP_DAILY", "7"),
                keep_weekly: get_or("KEEP_WEEKLY", "4"),
                keep_monthly: get_or("KEEP_MONTHLY", "12"),
                keep_yearly: get_or("KEEP_YEARLY", "3"),
            },
            alert_webhook_url: lookup("ALERT_WEBHOOK_URL").filter(|v| !v.is_empty()),
            discord_webhook_url: lookup("DISCORD_WEBHOOK").filter(|v| !v.is_empty()),
        })
    }
}
