//! Auth service configuration from environment variables.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    /// Allowed CORS origin; `None` allows any.
    pub cors_origin: Option<String>,
}

impl Config {
    /// Environment variables:
    /// - `AUTH_PORT` (default: 8080)
    /// - `AUTH_DB_PATH` (default: "auth.db")
    /// - `JWT_SECRET` (required)
    /// - `JWT_EXPIRES_IN`: token lifetime in seconds (default: 36000)
    /// - `CORS_ORIGIN` (default: any)
    pub fn from_env() -> Result<Self> {
        let port: u16 = std::env::var("AUTH_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("AUTH_PORT must be a port number")?;

        let db_path = std::env::var("AUTH_DB_PATH").unwrap_or_else(|_| "auth.db".to_string());

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            bail!("required environment variable JWT_SECRET is missing");
        }

        let expires_in: u64 = std::env::var("JWT_EXPIRES_IN")
            .unwrap_or_else(|_| "36000".to_string())
            .parse()
            .context("JWT_EXPIRES_IN must be a number of seconds")?;
        if expires_in == 0 {
            bail!("JWT_EXPIRES_IN must be positive");
        }

        let cors_origin = std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty());

        Ok(Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            db_path,
            jwt_secret,
            jwt_ttl: Duration::from_secs(expires_in),
            cors_origin,
        })
    }
}
