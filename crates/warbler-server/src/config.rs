use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Server settings, read from `WARBLER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub secret_key: String,
    pub host: String,
    pub port: u16,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: PathBuf::from(var_or("WARBLER_DB_PATH", "warbler.db")),
            secret_key: var_or("WARBLER_SECRET_KEY", "dev-secret-change-me"),
            host: var_or("WARBLER_HOST", "0.0.0.0"),
            port: parse_var("WARBLER_PORT", 5000)?,
            argon2_memory_kib: parse_var("WARBLER_ARGON2_MEMORY_KIB", 19 * 1024)?,
            argon2_iterations: parse_var("WARBLER_ARGON2_ITERATIONS", 2)?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("{name} is not a valid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
