// awsgate - Main Entry Point
//
// CLI front end over the execution pipeline: merge configuration sources,
// run one command through the orchestrator, render the resulting message.

use anyhow::{Context, Result};
use awsgate::config::ExecutorConfig;
use awsgate::executor::AwsExecutor;
use awsgate::provision::fetch::HttpFetcher;
use awsgate::provision::{BundleLayout, Provisioner, TarballBundle, ZipDist};
use awsgate::render::{Render, TerminalRenderer};
use awsgate::runner::ProcessRunner;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// awsgate: run AWS CLI commands through sandboxed provisioning
#[derive(Parser, Debug)]
#[command(name = "awsgate")]
#[command(version = "0.1.0")]
#[command(about = "Chat-driven AWS CLI executor with sandboxed provisioning", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration files, merged in order (later files win)
    #[arg(long = "config")]
    config: Vec<PathBuf>,

    /// Override the dependency cache directory
    #[arg(long)]
    deps_dir: Option<PathBuf>,

    /// Wall-clock limit for the wrapped command, in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// The command to run, e.g. `aws sts get-caller-identity`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ExecutorConfig::load_files(&args.config)
        .context("failed to load configuration")?;

    let layout = match &args.deps_dir {
        Some(root) => BundleLayout::new(root.clone()),
        None => BundleLayout::default_root().context("failed to locate dependency cache")?,
    };
    let arch = std::env::consts::ARCH;
    let provisioner = Provisioner::with_parts(
        layout,
        Arc::new(HttpFetcher::new()),
        vec![
            Box::new(TarballBundle::new(arch)),
            Box::new(ZipDist::new(arch)),
        ],
    );
    let executor = AwsExecutor::with_parts(
        config,
        provisioner,
        ProcessRunner::with_timeout(Duration::from_secs(args.timeout_secs)),
    );

    let command = args.command.join(" ");
    info!(command = %command, "handling command");

    let message = executor.execute(&command).await;
    println!("{}", TerminalRenderer.render(&message));

    if message.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
