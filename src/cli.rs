//! Command-line interface for qakit
//!
//! Exposes the library's helpers to shell-driven test pipelines:
//!
//! - `exec`: run a command over SSH with retries and print the result as JSON
//! - `wait-http`, `wait-port`, `wait-ssh`: block until a service is ready
//! - `filter-log`: cut a log file down to a test's excerpt
//!
//! Global options carry the process-wide defaults. Each falls back to its
//! `QAKIT_*` environment variable, so the binary is the one place where the
//! environment is read.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{
    LogSettings, Settings, SshSettings, ENV_LOG_FILE, ENV_LOG_LEVEL, ENV_SSH_KEY, ENV_SSH_PORT,
    ENV_SSH_RETRIES, ENV_SSH_RETRY_INTERVAL,
};
use crate::error::Result;
use crate::retry::interval_from_secs;

#[derive(Parser)]
#[command(
    name = "qakit",
    about = "QA helpers: retrying SSH execution, readiness waits and log filters",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Attempts per SSH command
    #[arg(long, env = ENV_SSH_RETRIES, default_value = "3", global = true)]
    pub ssh_retries: u32,

    /// Seconds to wait between SSH attempts
    #[arg(long, env = ENV_SSH_RETRY_INTERVAL, default_value = "5", global = true)]
    pub ssh_retry_interval: f64,

    /// SSH port used when a subcommand is given no --port
    #[arg(long, env = ENV_SSH_PORT, default_value = "22", global = true)]
    pub ssh_port: u16,

    /// Private key used when neither --password nor --key is given
    #[arg(long, env = ENV_SSH_KEY, global = true)]
    pub ssh_key: Option<PathBuf>,

    /// Log level (debug, info, warn, error, critical)
    #[arg(long, env = ENV_LOG_LEVEL, global = true)]
    pub log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long, env = ENV_LOG_FILE, global = true)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Builds the settings the library is driven with
    pub fn settings(&self) -> Result<Settings> {
        Ok(Settings {
            ssh: SshSettings {
                retries: self.ssh_retries,
                retry_interval: interval_from_secs(self.ssh_retry_interval)?,
                default_key: self.ssh_key.clone(),
                port: self.ssh_port,
                ..SshSettings::default()
            },
            log: LogSettings {
                level: self.log_level.clone(),
                file: self.log_file.clone(),
            },
        })
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command on a remote host over SSH
    Exec {
        #[arg(long)]
        host: String,

        #[arg(short, long)]
        user: String,

        #[arg(short, long, conflicts_with = "key")]
        password: Option<String>,

        /// Private key file; its type is detected automatically
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Defaults to --ssh-port
        #[arg(long)]
        port: Option<u16>,

        /// Command line to run remotely
        command: String,
    },

    /// Wait for a URL to answer with a status code
    WaitHttp {
        #[arg(long)]
        url: String,

        #[arg(long, default_value = "200")]
        status: u16,

        /// Seconds between checks
        #[arg(long, default_value = "1")]
        interval: f64,

        /// Seconds before giving up
        #[arg(long, default_value = "90")]
        timeout: f64,
    },

    /// Wait for a TCP port to be UP or DOWN
    WaitPort {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: u16,

        /// UP or DOWN
        #[arg(long, default_value = "UP")]
        state: String,

        #[arg(long, default_value = "60")]
        max_wait: f64,

        #[arg(long, default_value = "1")]
        interval: f64,
    },

    /// Wait for a host's SSH port to accept connections
    WaitSsh {
        #[arg(long)]
        host: String,

        /// Defaults to --ssh-port
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, default_value = "300")]
        timeout: f64,

        #[arg(long, default_value = "5")]
        interval: f64,
    },

    /// Keep only the part of a log between two markers
    FilterLog {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Treat the markers as regular expressions
        #[arg(long)]
        regex: bool,

        /// Write the excerpt here instead of rewriting the file in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
