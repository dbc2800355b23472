//! Remote command execution over SSH
//!
//! A command runs as one sequence per attempt:
//!
//! 1. Resolve credentials ([`ConnectionSession::new`]): key files must exist
//!    and be of a recognised type before any network activity
//! 2. Connect and authenticate ([`ConnectionSession::open`])
//! 3. Execute the command and decode stdout/stderr as UTF-8
//! 4. Collect the exit status
//! 5. Close the connection when the [`OpenSession`] goes out of scope
//!
//! Each stage fails with its own error kind (`KeyNotFound`, `Connect`,
//! `StreamDecode`, `Ssh`) and the whole sequence is wrapped by the retry
//! decorator, so a failed attempt reconnects from scratch on the next one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SshSettings;
use crate::error::{QaError, Result};
use crate::keys::KeyKind;
use crate::retry::{with_retry, CallbackHandler, NoopCallback, RetryConfig};
use crate::transport::{RemoteProcess, Ssh2Transport, SshConnection, SshTransport};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How to authenticate against the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    Password(String),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl SshAuth {
    pub fn password(password: impl Into<String>) -> Self {
        SshAuth::Password(password.into())
    }

    pub fn key(path: impl Into<PathBuf>) -> Self {
        SshAuth::PrivateKey {
            path: path.into(),
            passphrase: None,
        }
    }
}

/// A remote host plus the identity used to reach it
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub connect_timeout: Duration,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            auth,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Authentication material after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    Key {
        path: PathBuf,
        kind: KeyKind,
        passphrase: Option<String>,
    },
}

/// Outcome of one remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A not-yet-connected session with resolved credentials
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    target: SshTarget,
    credential: Credential,
}

impl ConnectionSession {
    /// Resolves the target's credentials without touching the network
    ///
    /// # Errors
    /// * `KeyNotFound` - the private key path does not exist
    /// * `Configuration` - the key file is unreadable or of an unknown type
    pub fn new(target: SshTarget) -> Result<Self> {
        let credential = match &target.auth {
            SshAuth::Password(password) => Credential::Password(password.clone()),
            SshAuth::PrivateKey { path, passphrase } => {
                if !path.exists() {
                    return Err(QaError::KeyNotFound(path.clone()));
                }
                let kind = KeyKind::detect_file(path)?;
                debug!("Detected {} key at {}", kind, path.display());
                Credential::Key {
                    path: path.clone(),
                    kind,
                    passphrase: passphrase.clone(),
                }
            }
        };

        Ok(Self { target, credential })
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Detected key type, when authenticating with a private key
    pub fn key_kind(&self) -> Option<KeyKind> {
        match &self.credential {
            Credential::Key { kind, .. } => Some(*kind),
            Credential::Password(_) => None,
        }
    }

    /// Connects and authenticates; any failure becomes a `Connect` error
    pub fn open(&self, transport: &dyn SshTransport) -> Result<OpenSession> {
        debug!(
            "Connecting to {}@{}:{}",
            self.target.username, self.target.host, self.target.port
        );
        let connection = transport
            .connect(&self.target, &self.credential)
            .map_err(|e| QaError::connect(&self.target.host, e))?;

        Ok(OpenSession {
            host: self.target.host.clone(),
            connection,
        })
    }
}

/// A live connection, closed when dropped
///
/// Close failures are logged and discarded.
pub struct OpenSession {
    host: String,
    connection: Box<dyn SshConnection>,
}

impl OpenSession {
    pub fn exec(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>> {
        self.connection.exec(command).map_err(|e| {
            QaError::Ssh(format!(
                "failed to execute '{}' on {}: {:#}",
                command, self.host, e
            ))
        })
    }
}

impl Drop for OpenSession {
    fn drop(&mut self) {
        if let Err(e) = self.connection.close() {
            debug!("Ignoring error while closing session to {}: {:#}", self.host, e);
        }
    }
}

fn decode_stream(stream: &'static str, bytes: anyhow::Result<Vec<u8>>) -> Result<String> {
    let bytes = bytes.map_err(|e| QaError::StreamDecode {
        stream,
        source: e.into(),
    })?;
    let text = String::from_utf8(bytes).map_err(|e| QaError::StreamDecode {
        stream,
        source: Box::new(e),
    })?;
    Ok(text.trim().to_string())
}

/// Runs one attempt: connect, execute, decode, collect status, disconnect
fn run_once(transport: &dyn SshTransport, target: &SshTarget, command: &str) -> Result<CommandResult> {
    let session = ConnectionSession::new(target.clone())?;
    let mut open = session.open(transport)?;
    let mut process = open.exec(command)?;

    let stdout = decode_stream("stdout", process.read_stdout())?;
    let stderr = decode_stream("stderr", process.read_stderr())?;
    let exit_code = process
        .exit_status()
        .map_err(|e| QaError::Ssh(format!("failed to get exit status of '{}': {:#}", command, e)))?;

    Ok(CommandResult {
        exit_code,
        stdout,
        stderr,
    })
}

/// Executes commands on remote hosts with retries
///
/// # Examples
///
/// ```no_run
/// use qakit::config::SshSettings;
/// use qakit::ssh::{CommandExecutor, SshAuth, SshTarget};
///
/// # async fn example() -> qakit::error::Result<()> {
/// let executor = CommandExecutor::new(&SshSettings::default())?;
/// let target = SshTarget::new("10.0.0.5", "qa", SshAuth::password("secret"));
///
/// let result = executor.execute(&target, "uname -a").await?;
/// println!("{} -> {}", result.exit_code, result.stdout);
/// # Ok(())
/// # }
/// ```
pub struct CommandExecutor {
    transport: Arc<dyn SshTransport>,
    retry_config: RetryConfig,
    callback: Arc<dyn CallbackHandler<CommandResult>>,
}

impl CommandExecutor {
    /// Creates an executor on the libssh2 transport with the SSH retry defaults
    pub fn new(settings: &SshSettings) -> Result<Self> {
        Ok(Self::with_transport(
            Arc::new(Ssh2Transport),
            settings.retry_config()?,
        ))
    }

    pub fn with_transport(transport: Arc<dyn SshTransport>, retry_config: RetryConfig) -> Self {
        Self {
            transport,
            retry_config,
            callback: Arc::new(NoopCallback),
        }
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn CallbackHandler<CommandResult>>) -> Self {
        self.callback = callback;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Runs `command` on `target`, reconnecting for every attempt
    pub async fn execute(&self, target: &SshTarget, command: &str) -> Result<CommandResult> {
        info!("Executing '{}' on {}@{}", command, target.username, target.host);

        let result = with_retry(
            || self.attempt(target, command),
            &self.retry_config,
            self.callback.as_ref(),
        )
        .await?;

        debug!(
            "'{}' on {} exited with {}",
            command, target.host, result.exit_code
        );
        Ok(result)
    }

    async fn attempt(&self, target: &SshTarget, command: &str) -> Result<CommandResult> {
        let transport = Arc::clone(&self.transport);
        let target = target.clone();
        let command = command.to_string();

        tokio::task::spawn_blocking(move || run_once(transport.as_ref(), &target, &command))
            .await
            .map_err(|e| QaError::Ssh(format!("ssh task failed: {}", e)))?
    }
}

/// Runs `command` on `target` over libssh2 with the given retry config
pub async fn execute_command(
    target: &SshTarget,
    command: &str,
    retry_config: &RetryConfig,
) -> Result<CommandResult> {
    CommandExecutor::with_transport(Arc::new(Ssh2Transport), retry_config.clone())
        .execute(target, command)
        .await
}
