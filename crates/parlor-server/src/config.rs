use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime settings, read from `PARLOR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Read-only connections in the store pool (the writer is extra).
    pub db_readers: usize,
    pub public_dir: PathBuf,
    pub session_ttl: Duration,
    /// Mark the session cookie `Secure` (only sent over HTTPS).
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            host: lookup("PARLOR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "PARLOR_PORT", 3000)?,
            db_path: lookup("PARLOR_DB_PATH").unwrap_or_else(|| "parlor.db".into()).into(),
            db_readers: parse_or(&lookup, "PARLOR_DB_READERS", 4)?,
            public_dir: lookup("PARLOR_PUBLIC_DIR").unwrap_or_else(|| "public".into()).into(),
            session_ttl: Duration::from_secs(parse_or(&lookup, "PARLOR_SESSION_TTL_SECS", 86_400)?),
            secure_cookies: parse_or(&lookup, "PARLOR_SECURE_COOKIES", false)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
