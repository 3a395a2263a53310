use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub broadcast_timeout_secs: u64,
    pub broadcast_fanout: usize,
    pub page_limit: usize,
    pub routing_timeout_ms: u64,
    pub ors_api_key: Option<String>,
    pub ors_base_url: String,
    pub seed_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            broadcast_timeout_secs: parse_or_default("BROADCAST_TIMEOUT_SECS", 60)?,
            broadcast_fanout: parse_or_default("BROADCAST_FANOUT", 5)?,
            page_limit: parse_or_default("PAGE_LIMIT", 5)?,
            routing_timeout_ms: parse_or_default("ROUTING_TIMEOUT_MS", 2_000)?,
            ors_api_key: non_empty_var("ORS_API_KEY"),
            ors_base_url: env::var("ORS_BASE_URL")
                .unwrap_or_else(|_| "https://api.openrouteservice.org".to_string()),
            seed_path: non_empty_var("SEED_PATH"),
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            broadcast_fanout: self.broadcast_fanout.max(1),
            broadcast_timeout: Duration::from_secs(self.broadcast_timeout_secs),
            routing_wait: Duration::from_millis(self.routing_timeout_ms),
            page_limit: self.page_limit.max(1),
        }
    }
}

/// Knobs the dispatch core reads. Everything else in [`Config`] belongs to the
/// process around it.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub broadcast_fanout: usize,
    pub broadcast_timeout: Duration,
    pub routing_wait: Duration,
    pub page_limit: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            broadcast_fanout: 5,
            broadcast_timeout: Duration::from_secs(60),
            routing_wait: Duration::from_secs(2),
            page_limit: 5,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
