// qakit: QA test-support helpers
// Exposes retry decoration, SSH command execution, readiness polling and log filters as a library

pub mod cli;
pub mod config;
pub mod error;
pub mod filters;
pub mod http;
pub mod keys;
pub mod logging;
pub mod poll;
pub mod retry;
pub mod ssh;
pub mod transport;
