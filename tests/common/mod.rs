#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use qakit::error::QaError;
use qakit::retry::CallbackHandler;
use qakit::ssh::{Credential, SshTarget};
use qakit::transport::{RemoteProcess, SshConnection, SshTransport};

/// What a scripted attempt does
#[derive(Debug, Clone)]
pub enum Step {
    RefuseConnect,
    FailExec,
    Run {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        exit: Option<i32>,
    },
}

impl Step {
    pub fn ok(stdout: &str, stderr: &str, exit: i32) -> Self {
        Step::Run {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            exit: Some(exit),
        }
    }

    pub fn raw(stdout: &[u8], stderr: &[u8]) -> Self {
        Step::Run {
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            exit: Some(0),
        }
    }

    pub fn no_exit_status() -> Self {
        Step::Run {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit: None,
        }
    }
}

/// Counters shared between a [`MockTransport`] and the connections it hands out
#[derive(Default)]
pub struct MockStats {
    pub connects: AtomicU32,
    pub closes: AtomicU32,
    pub commands: Mutex<Vec<String>>,
    pub credentials: Mutex<Vec<Credential>>,
}

/// In-memory transport that plays back one [`Step`] per connection
///
/// Once the script runs out, the last step repeats.
#[derive(Default)]
pub struct MockTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    fail_close: bool,
    pub stats: Arc<MockStats>,
}

impl MockTransport {
    pub fn scripted(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn failing_close(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fail_close: true,
            ..Self::default()
        })
    }

    pub fn connects(&self) -> u32 {
        self.stats.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.stats.closes.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.stats.commands.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Vec<Credential> {
        self.stats.credentials.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = steps.pop_front() {
            *last = Some(step.clone());
            step
        } else {
            last.clone().expect("mock transport has no script")
        }
    }
}

impl SshTransport for MockTransport {
    fn connect(&self, target: &SshTarget, credential: &Credential) -> Result<Box<dyn SshConnection>> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        self.stats.credentials.lock().unwrap().push(credential.clone());

        match self.next_step() {
            Step::RefuseConnect => Err(anyhow!("connection refused by {}", target.host)),
            step => Ok(Box::new(MockConnection {
                stats: Arc::clone(&self.stats),
                fail_close: self.fail_close,
                step,
            })),
        }
    }
}

struct MockConnection {
    stats: Arc<MockStats>,
    fail_close: bool,
    step: Step,
}

impl SshConnection for MockConnection {
    fn exec(&mut self, command: &str) -> Result<Box<dyn RemoteProcess>> {
        self.stats.commands.lock().unwrap().push(command.to_string());

        match &self.step {
            Step::Run {
                stdout,
                stderr,
                exit,
            } => Ok(Box::new(MockProcess {
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                exit: *exit,
            })),
            _ => Err(anyhow!("channel open failed")),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            Err(anyhow!("socket already closed"))
        } else {
            Ok(())
        }
    }
}

struct MockProcess {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit: Option<i32>,
}

impl RemoteProcess for MockProcess {
    fn read_stdout(&mut self) -> Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.stdout))
    }

    fn read_stderr(&mut self) -> Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.stderr))
    }

    fn exit_status(&mut self) -> Result<i32> {
        self.exit.ok_or_else(|| anyhow!("channel closed without exit status"))
    }
}

/// Callback that records every notification it receives
#[derive(Default)]
pub struct RecordingCallback {
    pub successes: AtomicU32,
    pub failures: Mutex<Vec<String>>,
}

impl RecordingCallback {
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

impl<T> CallbackHandler<T> for RecordingCallback {
    fn on_success(&self, _result: &T) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_failure(&self, error: &QaError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

pub fn fixture(name: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/keys")
        .join(name)
}
