//! Forum service configuration from environment variables.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::chat::HubConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: String,
    pub jwt_secret: String,
    /// Allowed CORS origin; `None` allows any.
    pub cors_origin: Option<String>,
    pub hub: HubConfig,
}

/// Upper bound for `CHAT_PING_INTERVAL_SECS`.
pub const MAX_PING_INTERVAL_SECS: u64 = 3600;

fn ping_interval(secs: u64) -> Result<Duration> {
    if secs == 0 || secs > MAX_PING_INTERVAL_SECS {
        bail!("CHAT_PING_INTERVAL_SECS must be between 1 and {MAX_PING_INTERVAL_SECS}, got {secs}");
    }
    Ok(Duration::from_secs(secs))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        _ => Ok(default),
    }
}

impl Config {
    /// Environment variables:
    /// - `FORUM_PORT` (default: 8081)
    /// - `FORUM_DB_PATH` (default: "forum.db")
    /// - `JWT_SECRET` (required, shared with the auth service)
    /// - `CHAT_HISTORY_LIMIT` (default: 50)
    /// - `CHAT_PING_INTERVAL_SECS` (default: 25, at most 3600)
    /// - `CHAT_OUTBOUND_CAPACITY` (default: 256)
    /// - `CORS_ORIGIN` (default: any)
    pub fn from_env() -> Result<Self> {
        let port: u16 = env_or("FORUM_PORT", 8081)?;
        let db_path = std::env::var("FORUM_DB_PATH").unwrap_or_else(|_| "forum.db".to_string());

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            bail!("required environment variable JWT_SECRET is missing");
        }

        let defaults = HubConfig::default();
        let history_limit: i64 = env_or("CHAT_HISTORY_LIMIT", defaults.history_limit)?;
        let ping_interval = ping_interval(env_or("CHAT_PING_INTERVAL_SECS", defaults.ping_interval.as_secs())?)?;
        let outbound_capacity: usize = env_or("CHAT_OUTBOUND_CAPACITY", defaults.outbound_capacity)?;
        if outbound_capacity == 0 {
            bail!("CHAT_OUTBOUND_CAPACITY must be positive");
        }

        let cors_origin = std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty());

        Ok(Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            db_path,
            jwt_secret,
            cors_origin,
            hub: HubConfig {
                history_limit,
                ping_interval,
                outbound_capacity,
                ..defaults
            },
        })
    }
}
