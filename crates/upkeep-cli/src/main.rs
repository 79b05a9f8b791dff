//! upkeep - gated dependency upgrade pipeline
//!
//! Runs with no arguments from a clean checkout:
//!
//! 1. waits for background `cargo` processes to exit
//! 2. snapshots the resolved dependency tree
//! 3. `cargo update`, validated by the full check suite, then committed
//! 4. `cargo upgrade --incompatible`, validated and committed the same way
//! 5. prints where the snapshots are and how to diff them
//!
//! Nothing is pushed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use upkeep_checks::{CheckSuite, OutputMode};
use upkeep_cli::{fail, load_config, log_level, parse_args};
use upkeep_core::{CargoCli, GitCli, PgrepInspector, UpgradePipeline};

#[derive(Parser)]
#[command(name = "upkeep")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Update and upgrade Cargo dependencies behind the check suite", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workspace to operate on (default: current directory)
    #[arg(long, env = "UPKEEP_WORKSPACE")]
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli: Cli = match parse_args() {
        Ok(cli) => cli,
        Err(code) => return code,
    };
    upkeep_core::init_tracing(cli.json, log_level(cli.verbose));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.workspace)?;
    let root = config.workspace_root.clone();
    info!(workspace = %root.display(), "starting dependency upkeep");

    let suite = CheckSuite::for_workspace(&config, OutputMode::Inherit);
    let pipeline = UpgradePipeline::new(
        config,
        Arc::new(GitCli::new(&root)),
        Arc::new(CargoCli::new(&root)),
        Arc::new(PgrepInspector::new()),
        Arc::new(suite),
    );

    let report = pipeline.run().await?;
    print!("{report}");
    Ok(())
}
