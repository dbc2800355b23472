//! Remote-shell transport
//!
//! The SSH executor talks to remote hosts through the [`SshTransport`] trait
//! so that connection handling can be exercised without a live server.
//! [`Ssh2Transport`] is the production implementation on top of libssh2.
//!
//! All methods are blocking; callers run them on a blocking worker thread.
//! Errors are reported as `anyhow` errors with context and translated into
//! typed [`QaError`](crate::error::QaError)s by the session layer.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};

use anyhow::{anyhow, bail, Context, Result};
use ssh2::{Channel, Session};
use tracing::debug;

use crate::ssh::{Credential, SshTarget};

/// Opens authenticated connections to remote hosts
pub trait SshTransport: Send + Sync {
    /// Connects and authenticates; an `Ok` connection is ready for `exec`
    fn connect(&self, target: &SshTarget, credential: &Credential) -> Result<Box<dyn SshConnection>>;
}

/// An authenticated connection
pub trait SshConnection: Send {
    /// Starts `command` on the remote host
    fn exec(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>>;

    fn close(&mut self) -> Result<()>;
}

/// A command started with [`SshConnection::exec`]
pub trait RemoteProcess: Send {
    fn read_stdout(&mut self) -> Result<Vec<u8>>;

    fn read_stderr(&mut self) -> Result<Vec<u8>>;

    /// Waits for the command to finish and returns its exit status
    fn exit_status(&mut self) -> Result<i32>;
}

/// libssh2-backed transport
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Transport;

impl SshTransport for Ssh2Transport {
    fn connect(&self, target: &SshTarget, credential: &Credential) -> Result<Box<dyn SshConnection>> {
        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}:{}", target.host, target.port))?
            .next()
            .ok_or_else(|| anyhow!("No address found for {}:{}", target.host, target.port))?;

        let tcp = TcpStream::connect_timeout(&addr, target.connect_timeout)
            .with_context(|| format!("TCP connect to {} failed", addr))?;
        tcp.set_read_timeout(Some(target.connect_timeout)).ok();
        tcp.set_write_timeout(Some(target.connect_timeout)).ok();

        let mut session = Session::new().context("SSH session init failed")?;
        session.set_tcp_stream(tcp);
        session.handshake().context("SSH handshake failed")?;

        match credential {
            Credential::Password(password) => session
                .userauth_password(&target.username, password)
                .context("SSH password authentication failed")?,
            Credential::Key {
                path,
                kind,
                passphrase,
            } => {
                debug!("Authenticating with {} key {}", kind, path.display());
                session
                    .userauth_pubkey_file(&target.username, None, path, passphrase.as_deref())
                    .context("SSH public key authentication failed")?
            }
        }

        if !session.authenticated() {
            bail!("SSH authentication rejected for user '{}'", target.username);
        }

        Ok(Box::new(Ssh2Connection { session }))
    }
}

struct Ssh2Connection {
    session: Session,
}

impl SshConnection for Ssh2Connection {
    fn exec(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>> {
        let mut channel = self
            .session
            .channel_session()
            .context("SSH channel open failed")?;
        channel.exec(command).context("SSH exec failed")?;
        Ok(Box::new(Ssh2Process { channel }))
    }

    fn close(&mut self) -> Result<()> {
        self.session
            .disconnect(None, "closing", None)
            .context("SSH disconnect failed")
    }
}

struct Ssh2Process {
    channel: Channel,
}

impl RemoteProcess for Ssh2Process {
    fn read_stdout(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.channel
            .read_to_end(&mut buf)
            .context("SSH stdout read failed")?;
        Ok(buf)
    }

    fn read_stderr(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.channel
            .stderr()
            .read_to_end(&mut buf)
            .context("SSH stderr read failed")?;
        Ok(buf)
    }

    fn exit_status(&mut self) -> Result<i32> {
        self.channel.wait_close().context("SSH channel close failed")?;
        self.channel
            .exit_status()
            .context("SSH exit status unavailable")
    }
}
