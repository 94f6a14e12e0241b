//! nvr - remote control for a running Neovim.
//!
//! Opens files, runs commands and evaluates expressions in an existing
//! editor over its RPC socket, optionally blocking until the opened buffers
//! are closed.

mod commands;
mod neomux;
mod socket;

use anyhow::Result;
use clap::Parser;
use commands::{FileRequest, OpenMode};
use neomux::{Neomux, Step};
use nvremote_core::{NvimApi, RpcClient, RpcError, WaitCoordinator, WaitOutcome};
use socket::DiscoveryInputs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "nvr")]
#[command(about = "Remote control for a running Neovim")]
struct Args {
    /// Socket of the editor to control
    #[arg(long, env = "NVIM_LISTEN_ADDRESS")]
    servername: Option<String>,

    /// Open files in the current window ("-" reads stdin)
    #[arg(long, num_args = 1.., value_name = "FILE")]
    remote: Vec<String>,

    /// Like --remote, then wait for the buffers to be deleted
    #[arg(long, num_args = 1.., value_name = "FILE")]
    remote_wait: Vec<String>,

    /// Open files in new tabs
    #[arg(long, num_args = 1.., value_name = "FILE")]
    remote_tab: Vec<String>,

    /// Like --remote-tab, then wait for the buffers to be deleted
    #[arg(long, num_args = 1.., value_name = "FILE")]
    remote_tab_wait: Vec<String>,

    /// Evaluate expressions and print the results
    #[arg(long, num_args = 1.., value_name = "EXPR")]
    remote_expr: Vec<String>,

    /// Run a command after opening files (repeatable)
    #[arg(short = 'c', value_name = "CMD")]
    command: Vec<String>,

    /// Run a command before opening files (repeatable)
    #[arg(long = "cc", value_name = "CMD")]
    before: Vec<String>,

    /// Open files in horizontal splits
    #[arg(short = 'o', num_args = 1.., value_name = "FILE")]
    split: Vec<String>,

    /// Open files in vertical splits
    #[arg(short = 'O', num_args = 1.., value_name = "FILE")]
    vsplit: Vec<String>,

    /// Do not print error messages
    #[arg(short = 's')]
    silent: bool,

    /// Seconds to wait for buffers before giving up
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    wait_timeout: u64,

    /// Make window N current before opening files
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    window: Option<u32>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    neomux: Option<Neomux>,
}

impl Args {
    fn file_requests(&self) -> Vec<FileRequest> {
        let groups: [(&[String], OpenMode, bool); 6] = [
            (self.remote.as_slice(), OpenMode::Edit, false),
            (self.remote_wait.as_slice(), OpenMode::Edit, true),
            (self.remote_tab.as_slice(), OpenMode::Tab, false),
            (self.remote_tab_wait.as_slice(), OpenMode::Tab, true),
            (self.split.as_slice(), OpenMode::Split, false),
            (self.vsplit.as_slice(), OpenMode::VSplit, false),
        ];
        groups
            .into_iter()
            .flat_map(|(paths, mode, wait)| {
                paths.iter().map(move |p| FileRequest::new(p.as_str(), mode, wait))
            })
            .collect()
    }

    /// Requests sent before any file is opened: `--cc` commands, then
    /// `--remote-expr` expressions, then the `--window` switch.
    fn steps_before_files(&self) -> Vec<Step> {
        let mut steps: Vec<Step> = self.before.iter().cloned().map(Step::Command).collect();
        steps.extend(self.remote_expr.iter().cloned().map(Step::Eval));
        if let Some(window) = self.window {
            steps.push(Step::Command(neomux::window_switch(window)));
        }
        steps
    }

    /// Requests sent after the files: `-c` commands, then the subcommand.
    fn steps_after_files(&self) -> Vec<Step> {
        let mut steps: Vec<Step> = self.command.iter().cloned().map(Step::Command).collect();
        if let Some(neomux) = &self.neomux {
            steps.extend(neomux.steps());
        }
        steps
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let default_level = if args.debug { "debug" } else { "warn" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(&args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            if !args.silent {
                eprintln!("nvr: {:#}", err);
            }
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Process status for an error: the core's kind-specific code, else 1.
fn exit_status(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<RpcError>()
        .map_or(1, |e| clamp_status(i64::from(e.exit_code())))
}

fn clamp_status(code: i64) -> u8 {
    u8::try_from(code.clamp(0, 255)).unwrap_or(1)
}

async fn run(args: &Args) -> Result<u8> {
    let inputs = DiscoveryInputs::from_env(args.servername.clone());
    let path = socket::discover(&inputs).await?;
    info!("Connecting to {}", path.display());

    let client = Arc::new(RpcClient::connect(&path).await?);
    let api = NvimApi::new(client.clone());

    neomux::run_steps(&api, &args.steps_before_files()).await?;

    let mut stdin = tokio::io::stdin();
    let waits = commands::open_files(&api, &args.file_requests(), &mut stdin).await?;

    neomux::run_steps(&api, &args.steps_after_files()).await?;

    if waits.is_empty() {
        return Ok(0);
    }

    debug!("Waiting on {} buffer(s)", waits.len());
    let coordinator = WaitCoordinator::with_api(client, api);
    let outcomes = coordinator
        .wait_for_all(&waits, Duration::from_secs(args.wait_timeout))
        .await?;
    Ok(status_for(&outcomes))
}

/// Editor exit status if the editor quit while we waited, else 0.
fn status_for(outcomes: &[WaitOutcome]) -> u8 {
    outcomes
        .iter()
        .find_map(|o| match o {
            WaitOutcome::HostExited(code) => Some(clamp_status(*code)),
            WaitOutcome::Closed => None,
        })
        .unwrap_or(0)
}
