use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use simplelog::LevelFilter;

/// Settings read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub listen_addr: SocketAddr,
    pub turn_timeout: Duration,
    pub scan_interval: Duration,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        let jwt_secret = lookup("JWT_SECRET").ok_or_else(|| anyhow!("$JWT_SECRET is not set"))?;

        let port: u16 = parse_or(&lookup, "LISTEN_PORT", 3000)?;
        let turn_timeout: u64 = parse_or(&lookup, "TURN_TIMEOUT_SECS", 20)?;
        let scan_interval: u64 = parse_or(&lookup, "TURN_SCAN_SECS", 5)?;
        if scan_interval == 0 {
            return Err(anyhow!("$TURN_SCAN_SECS must be positive"));
        }
        let log_level = parse_or(&lookup, "LOG_LEVEL", LevelFilter::Debug)?;

        Ok(Config {
            database_url,
            jwt_secret,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            turn_timeout: Duration::from_secs(turn_timeout),
            scan_interval: Duration::from_secs(scan_interval),
            log_level,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().with_context(|| format!("${} is not valid: {:?}", key, raw)),
        None => Ok(default),
    }
}
