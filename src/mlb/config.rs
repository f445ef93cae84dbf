use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};

use crate::mlb::error::ConfigError;

pub const MLB_API_BASE_URL: &str = "https://statsapi.mlb.com/api/v1";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_SCHEDULE_DAYS: i64 = 7;

const ENV_STORE_URL: &str = "SUPABASE_URL";
const ENV_STORE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
const ENV_API_BASE_URL: &str = "MLB_API_BASE_URL";
const ENV_HTTP_TIMEOUT: &str = "MLBSYNC_HTTP_TIMEOUT_SECS";

/// Settings for one run. Built once at startup and handed to every pipeline by
/// reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub http_timeout: Duration,
    pub season: i32,
    pub today: NaiveDate,
    pub schedule_days: i64,
}

/// Credentials for the hosted store. Only required when writing to it.
#[derive(Clone)]
pub struct StoreCredentials {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = non_empty(lookup(ENV_API_BASE_URL))
            .unwrap_or_else(|| MLB_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let http_timeout = match non_empty(lookup(ENV_HTTP_TIMEOUT)) {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or(ConfigError::Invalid { key: ENV_HTTP_TIMEOUT, value: raw.clone() })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let today = Utc::now().date_naive();
        Ok(Config {
            api_base_url,
            http_timeout,
            season: today.year(),
            today,
            schedule_days: DEFAULT_SCHEDULE_DAYS,
        })
    }
}

impl StoreCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = non_empty(lookup(ENV_STORE_URL)).ok_or(ConfigError::Missing(ENV_STORE_URL))?;
        let service_key =
            non_empty(lookup(ENV_STORE_KEY)).ok_or(ConfigError::Missing(ENV_STORE_KEY))?;
        Ok(StoreCredentials {
            url: url.trim_end_matches('/').to_string(),
            service_key,
        })
    }
}
