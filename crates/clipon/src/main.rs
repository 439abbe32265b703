//! `clipon` - CLI for the clipboard history recorder
//!
//! This binary runs the daemon (`clipon daemon`) and provides the client
//! commands that talk to it over the service socket.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::Instant;

use clipon::cli::{Cli, Command, ConfigCommand, DeleteCommand, ListCommand};
use clipon::options::OptionKey;
use clipon::protocol::{Request, Response};
use clipon::{init_logging, Client, Config, Error, MonitorState};

/// How long `start` waits for a freshly spawned daemon to answer.
const START_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `stop` waits for the daemon to go away.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_STEP: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // The daemon sets up its own logging once its directories exist.
    if !matches!(cli.command, Command::Daemon) {
        init_logging(cli.verbosity(), None);
    }
    let client = Client::new(config.socket_path());

    match &cli.command {
        Command::Daemon => run_daemon(&cli, &config).await,
        Command::Start => handle_start(&cli, &config, &client).await,
        Command::Stop => handle_stop(&client).await,
        Command::Status(status) => handle_status(&client, status.json).await,
        Command::Info => handle_info(&client).await,
        Command::List(list) => handle_list(&client, list).await,
        Command::Size => {
            let size = history_size(&client).await?;
            println!("{size}");
            Ok(())
        }
        Command::Clear => {
            expect_done(call(&client, &Request::ClearHistory).await?)?;
            Ok(())
        }
        Command::Delete(delete) => handle_delete(&client, delete).await,
        Command::Save => {
            if !expect_accepted(call(&client, &Request::SaveHistory).await?)? {
                bail!("failed to save history");
            }
            Ok(())
        }
        Command::Config(config_cmd) => handle_config(&client, config_cmd).await,
        Command::Pause => {
            if !expect_accepted(call(&client, &Request::Pause).await?)? {
                bail!("daemon is shutting down");
            }
            Ok(())
        }
        Command::Resume => {
            if !expect_accepted(call(&client, &Request::Resume).await?)? {
                bail!("daemon is shutting down");
            }
            Ok(())
        }
    }
}

async fn run_daemon(cli: &Cli, config: &Config) -> Result<()> {
    config.ensure_dirs()?;

    let log_path = config.log_path();
    let log_file = config.logging.log_to_file.then_some(log_path.as_path());
    init_logging(cli.verbosity(), log_file);

    clipon::daemon::run(config)
        .await
        .context("daemon failed")
}

/// Send `request`, turning "not running" into a friendlier error.
async fn call(client: &Client, request: &Request) -> Result<Response> {
    match client.call(request).await {
        Ok(Response::Error { message }) => bail!("daemon rejected request: {message}"),
        Ok(response) => Ok(response),
        Err(Error::DaemonNotRunning) => {
            bail!("daemon is not running; start it with `clipon start`")
        }
        Err(e) => Err(e).context("failed to reach daemon"),
    }
}

fn unexpected(response: &Response) -> anyhow::Error {
    anyhow::anyhow!("unexpected response from daemon: {response:?}")
}

fn expect_accepted(response: Response) -> Result<bool> {
    match response {
        Response::Accepted(accepted) => Ok(accepted),
        other => Err(unexpected(&other)),
    }
}

fn expect_done(response: Response) -> Result<()> {
    match response {
        Response::Done => Ok(()),
        other => Err(unexpected(&other)),
    }
}

async fn history_size(client: &Client) -> Result<usize> {
    match call(client, &Request::HistorySize).await? {
        Response::Size(size) => Ok(size),
        other => Err(unexpected(&other)),
    }
}

async fn handle_start(cli: &Cli, config: &Config, client: &Client) -> Result<()> {
    if client.is_running().await {
        println!("Daemon already running");
        return Ok(());
    }

    let exe = std::env::current_exe().context("cannot locate the clipon executable")?;
    let mut command = std::process::Command::new(exe);
    if let Some(path) = &cli.config {
        command.arg("--config").arg(path);
    }
    command
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // Keep terminal signals aimed at this shell away from the daemon
        .process_group(0);

    let mut child = command.spawn().context("failed to spawn daemon")?;

    let deadline = Instant::now() + START_TIMEOUT;
    loop {
        if client.is_running().await {
            println!("Daemon started");
            return Ok(());
        }
        if let Some(status) = child.try_wait()? {
            bail!(
                "daemon exited during startup ({status}); see {}",
                config.log_path().display()
            );
        }
        if Instant::now() >= deadline {
            bail!("daemon did not answer within {}s", START_TIMEOUT.as_secs());
        }
        tokio::time::sleep(POLL_STEP).await;
    }
}

async fn handle_stop(client: &Client) -> Result<()> {
    match client.call(&Request::Stop).await {
        Ok(response) => {
            expect_accepted(response)?;
        }
        Err(Error::DaemonNotRunning) => {
            println!("Daemon is not running");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to reach daemon"),
    }

    let deadline = Instant::now() + STOP_TIMEOUT;
    while client.is_running().await {
        if Instant::now() >= deadline {
            bail!("daemon did not stop within {}s", STOP_TIMEOUT.as_secs());
        }
        tokio::time::sleep(POLL_STEP).await;
    }
    println!("Daemon stopped");
    Ok(())
}

async fn handle_status(client: &Client, json: bool) -> Result<()> {
    let state = match client.call(&Request::GetStatus).await {
        Ok(Response::Status(state)) => Some(state),
        Ok(other) => return Err(unexpected(&other)),
        Err(Error::DaemonNotRunning) => None,
        Err(e) => return Err(e).context("failed to reach daemon"),
    };

    if json {
        let status = serde_json::json!({
            "daemon_running": state.is_some(),
            "state": state,
            "socket": client.socket(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        match state {
            Some(MonitorState::Active) => println!("active"),
            Some(MonitorState::Inactive) => println!("paused"),
            Some(MonitorState::Stopped) => println!("stopping"),
            None => println!("not running"),
        }
    }
    Ok(())
}

async fn handle_info(client: &Client) -> Result<()> {
    match call(client, &Request::GetInfo).await? {
        Response::Info(info) => {
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

async fn handle_list(client: &Client, list: &ListCommand) -> Result<()> {
    let size = history_size(client).await?;
    let indices = match list.indices(size) {
        Ok(indices) => indices,
        Err(e) => {
            println!("{e}");
            return Ok(());
        }
    };

    for index in indices {
        match call(client, &Request::GetEntry { index }).await? {
            Response::Entry(Some(entry)) => println!("{}", list.format_entry(index, &entry.text)),
            Response::Entry(None) => println!("Entry {index} does not exist"),
            other => return Err(unexpected(&other)),
        }
    }
    Ok(())
}

async fn handle_delete(client: &Client, delete: &DeleteCommand) -> Result<()> {
    let (start, end) = delete.range();
    if !expect_accepted(call(client, &Request::DeleteRange { start, end }).await?)? {
        let size = history_size(client).await?;
        bail!("invalid range [{start}, {end}). Total is {size}");
    }
    Ok(())
}

async fn handle_config(client: &Client, config: &ConfigCommand) -> Result<()> {
    config.validate()?;
    let changes = config.changes();

    if changes.is_empty() {
        let Response::Info(info) = call(client, &Request::GetInfo).await? else {
            bail!("unexpected response from daemon");
        };
        println!("{}: {}", OptionKey::Autosave, info.history.autosave);
        println!("{}: {}", OptionKey::MaxEntry, info.history.max_entry);
        println!("{}: {}", OptionKey::MaxLength, info.history.max_length);
        return Ok(());
    }

    let mut failed = false;
    for (key, value) in changes {
        let request = Request::Configure {
            key: key.to_string(),
            value: value.to_string(),
        };
        if !expect_accepted(call(client, &request).await?)? {
            eprintln!("Failed to set option {key} to value {value}");
            failed = true;
        }
    }

    if failed {
        bail!("some options were not changed");
    }
    Ok(())
}
