use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;
use tokio::runtime::Builder;
use tracing::{debug, info};

use qakit::cli::{Cli, Commands};
use qakit::filters::{generic_log_filter, regex_log_filter, FilterOutcome};
use qakit::logging::init_logging;
use qakit::poll::{wait_for_http, wait_for_port_state, wait_for_ssh};
use qakit::retry::interval_from_secs;
use qakit::ssh::{CommandExecutor, SshAuth, SshTarget};

fn main() -> Result<()> {
    // Everything runs sequentially, a single-threaded runtime is enough
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    let code = runtime.block_on(async_main())?;
    std::process::exit(code);
}

fn seconds(value: f64) -> Result<Duration> {
    Ok(interval_from_secs(value)?)
}

async fn async_main() -> Result<i32> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_logging(&settings.log)?;
    debug!("Running with {:?}", settings);

    match cli.command {
        Commands::Exec {
            host,
            user,
            password,
            key,
            port,
            command,
        } => {
            let auth = match (password, key) {
                (Some(password), _) => Some(SshAuth::password(password)),
                (None, Some(key)) => Some(SshAuth::key(key)),
                (None, None) => None,
            };
            let auth = settings.ssh.resolve_auth(auth)?;
            let target = SshTarget::new(host, user, auth)
                .with_port(port.unwrap_or(settings.ssh.port))
                .with_connect_timeout(settings.ssh.connect_timeout);

            let executor = CommandExecutor::new(&settings.ssh)?;
            let result = executor.execute(&target, &command).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.exit_code)
        }
        Commands::WaitHttp {
            url,
            status,
            interval,
            timeout,
        } => {
            wait_for_http(&url, status, seconds(interval)?, seconds(timeout)?).await?;
            Ok(0)
        }
        Commands::WaitPort {
            host,
            port,
            state,
            max_wait,
            interval,
        } => {
            wait_for_port_state(&host, port, &state, seconds(max_wait)?, seconds(interval)?).await?;
            Ok(0)
        }
        Commands::WaitSsh {
            host,
            port,
            timeout,
            interval,
        } => {
            let port = port.unwrap_or(settings.ssh.port);
            wait_for_ssh(&host, Some(port), seconds(timeout)?, seconds(interval)?).await?;
            Ok(0)
        }
        Commands::FilterLog {
            file,
            start,
            end,
            regex,
            output,
        } => {
            let inplace = output.is_none();
            let outcome = if regex {
                let start = Regex::new(&start).context("Invalid start pattern")?;
                let end = Regex::new(&end).context("Invalid end pattern")?;
                regex_log_filter(&file, &start, &end, inplace, output.as_deref())?
            } else {
                generic_log_filter(&file, &start, &end, inplace, output.as_deref())?
            };

            match outcome {
                FilterOutcome::Written { lines, end_found } => {
                    info!("Kept {} lines (end marker found: {})", lines, end_found)
                }
                FilterOutcome::StartNotFound => info!("Start marker not found, file left unchanged"),
            }
            Ok(0)
        }
    }
}
