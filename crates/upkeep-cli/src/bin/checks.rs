//! upkeep-checks - run named quality checks
//!
//! `upkeep-checks` runs every check; `upkeep-checks fmt clippy` runs just
//! those, in order. `upkeep-checks self` verifies that the registry, the
//! `all` check and the CI workflows list the same checks.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use upkeep_checks::{CheckRegistry, CheckSuite, OutputMode};
use upkeep_cli::{fail, load_config, log_level, parse_args};

#[derive(Parser)]
#[command(name = "upkeep-checks")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run the workspace quality checks", long_about = None)]
struct Cli {
    /// Checks to run, in order (default: all)
    checks: Vec<String>,

    /// List the registered checks and exit
    #[arg(long, conflicts_with = "checks")]
    list: bool,

    /// Use each check's auto-repair command where one exists
    #[arg(long)]
    fix: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Workspace to check (default: current directory)
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
    let suite = CheckSuite::for_workspace(&config, OutputMode::Inherit).with_fix(cli.fix);

    if cli.list {
        print_registry(&suite.annotated_registry()?);
        return Ok(());
    }

    suite.run(cli.checks.as_slice()).await?;
    println!("All testcases passed.");
    Ok(())
}

fn print_registry(registry: &CheckRegistry) {
    for entry in registry.entries() {
        let ci = if entry.is_aggregate() {
            "aggregate"
        } else if entry.declared_in_ci {
            "ci"
        } else {
            "no ci job"
        };
        println!("{:<10} {ci}", entry.name);
    }
}
