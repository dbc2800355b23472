//! Readiness polling
//!
//! [`wait_until`] re-evaluates a predicate every `interval` until it holds or
//! a deadline passes. Three waiters are built on it:
//!
//! - [`wait_for_http`]: a URL answers GET with an expected status code
//! - [`wait_for_port_state`]: a TCP port is accepting (or refusing) connections
//! - [`wait_for_ssh`]: the SSH port of a host is reachable
//!
//! Every waiter checks at least once and returns without sleeping when the
//! first check already succeeds.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::error::{QaError, Result};
use crate::ssh::DEFAULT_SSH_PORT;

/// Per-check timeout for raw TCP connects
pub const PORT_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for a single GET issued by the HTTP waiter
pub const HTTP_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

const MIN_CHECK_TIMEOUT: Duration = Duration::from_millis(100);

/// Deadline bookkeeping for a single wait call
#[derive(Debug, Clone, Copy)]
struct PollState {
    started: Instant,
    deadline: Instant,
    interval: Duration,
}

impl PollState {
    fn new(timeout: Duration, interval: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            interval,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Polls `predicate` until it returns true or `timeout` elapses
///
/// # Returns
/// * The time spent waiting, or `Timeout` naming `condition`
///
/// # Examples
///
/// ```
/// use qakit::poll::wait_until;
/// use std::time::Duration;
///
/// # async fn example() -> qakit::error::Result<()> {
/// let waited = wait_until("always ready", Duration::from_secs(1), Duration::ZERO, || async { true }).await?;
/// assert!(waited < Duration::from_secs(1));
/// # Ok(())
/// # }
/// ```
pub async fn wait_until<P, Fut>(
    condition: &str,
    timeout: Duration,
    interval: Duration,
    mut predicate: P,
) -> Result<Duration>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let state = PollState::new(timeout, interval);

    loop {
        if predicate().await {
            return Ok(state.elapsed());
        }

        if state.expired() {
            return Err(QaError::Timeout {
                condition: condition.to_string(),
                elapsed: state.elapsed(),
            });
        }

        debug!("Still waiting for {}, next check in {:?}", condition, state.interval);
        sleep(state.interval).await;
    }
}

/// Waits until `url` answers a GET with `status_code`
///
/// Request errors (refused connections, DNS failures, timeouts) count as
/// "not ready yet".
pub async fn wait_for_http(url: &str, status_code: u16, interval: Duration, timeout: Duration) -> Result<()> {
    let client = Client::builder()
        .timeout(timeout.clamp(MIN_CHECK_TIMEOUT, HTTP_CHECK_TIMEOUT))
        .build()?;
    wait_for_http_with(&client, url, status_code, interval, timeout).await
}

/// Same as [`wait_for_http`] using a caller-provided client
pub async fn wait_for_http_with(
    client: &Client,
    url: &str,
    status_code: u16,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let expected = StatusCode::from_u16(status_code)
        .map_err(|_| QaError::config(format!("invalid HTTP status code {}", status_code)))?;

    info!("Waiting for url: {} to return status code: {}", url, expected);
    let condition = format!("{} to return status {}", url, expected);

    let waited = wait_until(&condition, timeout, interval, || async {
        match client.get(url).send().await {
            Ok(resp) => resp.status() == expected,
            Err(e) => {
                debug!("GET {} failed, treating as not ready: {}", url, e);
                false
            }
        }
    })
    .await?;

    info!("{} returned {} after {:?}", url, expected, waited);
    Ok(())
}

/// Whether a port should be accepting or refusing connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Up,
    Down,
}

impl PortState {
    fn is_satisfied_by(self, listening: bool) -> bool {
        match self {
            PortState::Up => listening,
            PortState::Down => !listening,
        }
    }
}

impl FromStr for PortState {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Ok(PortState::Up),
            "DOWN" => Ok(PortState::Down),
            _ => Err(QaError::InvalidPortState(s.to_string())),
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Up => f.write_str("UP"),
            PortState::Down => f.write_str("DOWN"),
        }
    }
}

/// Attempts a TCP connect to `host:port` within `check_timeout`
///
/// Refusals, resolution failures and timeouts all report `false`.
pub async fn is_port_listening(host: &str, port: u16, check_timeout: Duration) -> bool {
    match timeout(check_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!("{}:{} not accepting connections: {}", host, port, e);
            false
        }
        Err(_) => {
            debug!("{}:{} connect timed out after {:?}", host, port, check_timeout);
            false
        }
    }
}

/// Waits until `host:port` reaches `state` ("UP" or "DOWN", case-insensitive)
///
/// An unrecognised state fails with `InvalidPortState` before any check.
/// Exhausting `max_wait` fails with `Connectivity`.
pub async fn wait_for_port_state(
    host: &str,
    port: u16,
    state: &str,
    max_wait: Duration,
    check_interval: Duration,
) -> Result<()> {
    let state: PortState = state.parse()?;
    wait_for_port(host, port, state, max_wait, check_interval).await
}

/// Same as [`wait_for_port_state`] with a caller-supplied listening check
pub async fn wait_for_port_state_with<C, Fut>(
    check: C,
    host: &str,
    port: u16,
    state: &str,
    max_wait: Duration,
    check_interval: Duration,
) -> Result<()>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let state: PortState = state.parse()?;
    poll_port(check, host, port, state, max_wait, check_interval).await
}

pub async fn wait_for_port(
    host: &str,
    port: u16,
    state: PortState,
    max_wait: Duration,
    check_interval: Duration,
) -> Result<()> {
    let check_timeout = max_wait.clamp(MIN_CHECK_TIMEOUT, PORT_CHECK_TIMEOUT);
    let check = || is_port_listening(host, port, check_timeout);
    poll_port(check, host, port, state, max_wait, check_interval).await
}

async fn poll_port<C, Fut>(
    mut check: C,
    host: &str,
    port: u16,
    state: PortState,
    max_wait: Duration,
    check_interval: Duration,
) -> Result<()>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    info!("Waiting for {}:{} to be {}", host, port, state);
    let condition = format!("{}:{} to be {}", host, port, state);

    let waited = wait_until(&condition, max_wait, check_interval, || {
        let listening = check();
        async move { state.is_satisfied_by(listening.await) }
    })
    .await
    .map_err(|e| match e {
        QaError::Timeout { elapsed, .. } => QaError::Connectivity {
            host: host.to_string(),
            port,
            state: state.to_string(),
            elapsed,
        },
        other => other,
    })?;

    info!("{}:{} is {} after {:?}", host, port, state, waited);
    Ok(())
}

pub async fn wait_for_port_up(host: &str, port: u16, max_wait: Duration, check_interval: Duration) -> Result<()> {
    wait_for_port(host, port, PortState::Up, max_wait, check_interval).await
}

pub async fn wait_for_port_down(host: &str, port: u16, max_wait: Duration, check_interval: Duration) -> Result<()> {
    wait_for_port(host, port, PortState::Down, max_wait, check_interval).await
}

/// Whether an SSH server is accepting TCP connections on `host:port`
pub async fn ssh_running(host: &str, port: u16) -> bool {
    is_port_listening(host, port, PORT_CHECK_TIMEOUT).await
}

/// Waits until the SSH port of `host` is reachable; `port` defaults to 22
pub async fn wait_for_ssh(host: &str, port: Option<u16>, timeout: Duration, interval: Duration) -> Result<()> {
    let port = port.unwrap_or(DEFAULT_SSH_PORT);
    wait_for_ssh_with(|| ssh_running(host, port), host, port, timeout, interval).await
}

/// SSH wait driven by a caller-supplied reachability check
pub async fn wait_for_ssh_with<C, Fut>(
    check: C,
    host: &str,
    port: u16,
    timeout: Duration,
    interval: Duration,
) -> Result<()>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    info!("Waiting for ssh on {}:{}", host, port);
    let condition = format!("ssh on {}:{}", host, port);

    wait_until(&condition, timeout, interval, check)
        .await
        .map(|_| ())
        .map_err(|e| match e {
            QaError::Timeout { elapsed, .. } => QaError::SshTimeout {
                host: host.to_string(),
                port,
                elapsed,
            },
            other => other,
        })
}
