//! Error taxonomy shared by every qakit module
//!
//! All failures surface as [`QaError`]. Each variant maps to an [`ErrorKind`]
//! discriminant, which is what retry eligibility is decided on and what
//! calling test code asserts against.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T, E = QaError> = std::result::Result<T, E>;

/// Discriminant for [`QaError`]
///
/// Retry configurations hold a set of these; an error is retried only when
/// its kind is a member of that set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    InvalidPortState,
    KeyNotFound,
    Connect,
    StreamDecode,
    Ssh,
    Timeout,
    Connectivity,
    SshTimeout,
    Http,
    Filter,
    Io,
    Other,
}

/// Errors raised by qakit operations
#[derive(Debug, Error)]
pub enum QaError {
    /// Invalid configuration supplied by the caller; never worth retrying
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid port state '{0}', expected UP or DOWN")]
    InvalidPortState(String),

    #[error("ssh key not found: {}", .0.display())]
    KeyNotFound(PathBuf),

    /// Connecting or authenticating to the remote host failed
    #[error("failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The command ran but one of its output streams could not be read as text
    #[error("failed to decode {stream} stream: {source}")]
    StreamDecode {
        stream: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("ssh error: {0}")]
    Ssh(String),

    #[error("timed out after {:.2}s waiting for {condition}", .elapsed.as_secs_f64())]
    Timeout { condition: String, elapsed: Duration },

    #[error("{host}:{port} did not reach state {state} within {:.2}s", .elapsed.as_secs_f64())]
    Connectivity {
        host: String,
        port: u16,
        state: String,
        elapsed: Duration,
    },

    #[error("ssh on {host}:{port} not reachable after {:.2}s", .elapsed.as_secs_f64())]
    SshTimeout {
        host: String,
        port: u16,
        elapsed: Duration,
    },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("log filter error: {0}")]
    Filter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QaError::Configuration(_) => ErrorKind::Configuration,
            QaError::InvalidPortState(_) => ErrorKind::InvalidPortState,
            QaError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            QaError::Connect { .. } => ErrorKind::Connect,
            QaError::StreamDecode { .. } => ErrorKind::StreamDecode,
            QaError::Ssh(_) => ErrorKind::Ssh,
            QaError::Timeout { .. } => ErrorKind::Timeout,
            QaError::Connectivity { .. } => ErrorKind::Connectivity,
            QaError::SshTimeout { .. } => ErrorKind::SshTimeout,
            QaError::Http(_) => ErrorKind::Http,
            QaError::Filter(_) => ErrorKind::Filter,
            QaError::Io(_) => ErrorKind::Io,
            QaError::Other(_) => ErrorKind::Other,
        }
    }

    /// True for errors caused by bad caller input rather than the environment
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::InvalidPortState
        )
    }

    /// True for the terminal outcomes of the readiness pollers
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::Connectivity | ErrorKind::SshTimeout
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        QaError::Configuration(message.into())
    }

    pub(crate) fn connect(host: &str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        QaError::Connect {
            host: host.to_string(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(QaError::Ssh("boom".into()).kind(), ErrorKind::Ssh);
        assert_eq!(
            QaError::KeyNotFound(PathBuf::from("/nope")).kind(),
            ErrorKind::KeyNotFound
        );
        assert_eq!(
            QaError::connect("host", anyhow::anyhow!("refused")).kind(),
            ErrorKind::Connect
        );
    }

    #[test]
    fn test_classification_helpers() {
        assert!(QaError::InvalidPortState("SIDEWAYS".into()).is_configuration());
        assert!(QaError::config("bad").is_configuration());
        assert!(!QaError::Ssh("x".into()).is_configuration());

        let timeout = QaError::SshTimeout {
            host: "h".into(),
            port: 22,
            elapsed: Duration::from_secs(1),
        };
        assert!(timeout.is_timeout());
        assert!(!QaError::Filter("x".into()).is_timeout());
    }

    #[test]
    fn test_connect_error_keeps_cause() {
        let err = QaError::connect("db01", anyhow::anyhow!("auth rejected"));
        let message = err.to_string();
        assert!(message.contains("db01"));
        assert!(message.contains("auth rejected"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
