//! Process-wide defaults
//!
//! Defaults are read once at the program boundary (environment variables or
//! CLI flags) into [`Settings`] and passed explicitly into the core. Nothing
//! below the boundary reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ErrorKind, QaError, Result};
use crate::retry::{interval_from_secs, RetryConfig};
use crate::ssh::{SshAuth, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SSH_PORT};

pub const ENV_SSH_RETRIES: &str = "QAKIT_SSH_RETRIES";
pub const ENV_SSH_RETRY_INTERVAL: &str = "QAKIT_SSH_RETRY_INTERVAL";
pub const ENV_SSH_KEY: &str = "QAKIT_SSH_KEY";
pub const ENV_SSH_PORT: &str = "QAKIT_SSH_PORT";
pub const ENV_LOG_LEVEL: &str = "QAKIT_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "QAKIT_LOG_FILE";

/// Error kinds retried by default around SSH command execution
pub const SSH_RETRYABLE: [ErrorKind; 3] = [ErrorKind::Connect, ErrorKind::StreamDecode, ErrorKind::Ssh];

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub ssh: SshSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Reads settings from the `QAKIT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`; unset or empty values keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(raw) = get(ENV_SSH_RETRIES) {
            settings.ssh.retries = raw.trim().parse().map_err(|_| {
                QaError::config(format!("{} must be a whole number, got '{}'", ENV_SSH_RETRIES, raw))
            })?;
        }
        if let Some(raw) = get(ENV_SSH_RETRY_INTERVAL) {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                QaError::config(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_SSH_RETRY_INTERVAL, raw
                ))
            })?;
            settings.ssh.retry_interval = interval_from_secs(secs)?;
        }
        if let Some(raw) = get(ENV_SSH_PORT) {
            settings.ssh.port = raw.trim().parse().map_err(|_| {
                QaError::config(format!("{} must be a port number, got '{}'", ENV_SSH_PORT, raw))
            })?;
        }
        settings.ssh.default_key = get(ENV_SSH_KEY).map(PathBuf::from);
        settings.log.level = get(ENV_LOG_LEVEL);
        settings.log.file = get(ENV_LOG_FILE).map(PathBuf::from);

        Ok(settings)
    }
}

/// Defaults for SSH command execution
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Attempts per command
    pub retries: u32,
    pub retry_interval: Duration,
    /// Key used when the caller supplies no credential of its own
    pub default_key: Option<PathBuf>,
    /// Port used when a command names no port of its own
    pub port: u16,
    pub connect_timeout: Duration,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_interval: Duration::from_secs(5),
            default_key: None,
            port: DEFAULT_SSH_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SshSettings {
    /// Retry config covering every SSH failure stage
    pub fn retry_config(&self) -> Result<RetryConfig> {
        RetryConfig::new(SSH_RETRYABLE, self.retries, self.retry_interval)
    }

    /// Uses `auth` when given, otherwise the default key
    pub fn resolve_auth(&self, auth: Option<SshAuth>) -> Result<SshAuth> {
        match (auth, &self.default_key) {
            (Some(auth), _) => Ok(auth),
            (None, Some(path)) => Ok(SshAuth::key(path.clone())),
            (None, None) => Err(QaError::config(format!(
                "no ssh password or key given and {} is not set",
                ENV_SSH_KEY
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}
