use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_MAINTENANCE_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value}")]
    NotANumber { name: &'static str, value: String },
}

/// Everything the server reads from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Connection string, or `memory` for the in-memory database
    pub database_url: String,
    pub upload_dir: PathBuf,
    /// The URL `upload_dir` is served under
    pub public_url: String,
    /// How often expired sessions are cleared and member counts audited
    pub maintenance_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or(&lookup, "POTTOGETHER_SERVER_PORT", DEFAULT_PORT)?;
        let maintenance_secs = parse_or(
            &lookup,
            "POTTOGETHER_MAINTENANCE_SECS",
            DEFAULT_MAINTENANCE_SECS,
        )?;

        Ok(Self {
            port,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "memory".to_string()),
            upload_dir: lookup("POTTOGETHER_UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
            public_url: lookup("POTTOGETHER_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}/uploads")),
            maintenance_interval: Duration::from_secs(maintenance_secs.max(1)),
        })
    }

    pub fn uses_memory_database(&self) -> bool {
        self.database_url == "memory"
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::NotANumber { name, value }),
        None => Ok(default),
    }
}
