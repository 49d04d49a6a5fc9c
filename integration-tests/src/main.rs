//! End-to-end integration tests for the `taskguild` daemon.
//!
//! Spawns a real `taskguild` binary against a throwaway sqlite database and
//! task definition, then drives its HTTP RPC surface through a battery of
//! scenarios covering the task/process/interaction/event lifecycle.

mod harness;
mod scenarios;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use harness::{default_binary_path, TaskGuildHarness};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "taskguild-integration-tests")]
#[command(about = "End-to-end tests against a live taskguild daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to the taskguild binary under test.
    #[arg(short, long, default_value_os_t = default_binary_path())]
    binary: PathBuf,

    /// Scratch directory for the database and task definition.
    #[arg(short, long, default_value = "/tmp/taskguild-integration-test")]
    work_dir: PathBuf,

    /// Port for the daemon to listen on.
    #[arg(short, long, default_value = "8931")]
    port: u16,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(format!("integration_tests={log_level}")).init();

    if !args.binary.exists() {
        anyhow::bail!("taskguild binary not found at {:?}; build it first with: cargo build --bin taskguild", args.binary);
    }

    info!("starting taskguild integration tests against {:?}", args.binary);
    let mut harness = TaskGuildHarness::spawn(&args.binary, &args.work_dir, args.port).await.context("failed to start taskguild daemon")?;

    let result = scenarios::run_all(&mut harness).await;
    harness.shutdown().await;

    match result {
        Ok(()) => {
            info!("all integration scenarios passed");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "integration scenario failed");
            Err(err)
        }
    }
}
