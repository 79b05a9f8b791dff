//! Shared plumbing for the `upkeep` and `upkeep-checks` binaries.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::Level;
use upkeep_checks::SuiteError;
use upkeep_core::{UpkeepConfig, UpkeepError, FATAL_EXIT_CODE};

/// Parse the process arguments. Usage errors exit 9 like every other
/// fatal condition; `--help` and `--version` exit 0.
pub fn parse_args<P: Parser>() -> Result<P, ExitCode> {
    parse_args_from(std::env::args_os())
}

pub fn parse_args_from<P, I, T>(args: I) -> Result<P, ExitCode>
where
    P: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    P::try_parse_from(args).map_err(|e| {
        let code = usage_exit_code(&e);
        let _ = e.print();
        ExitCode::from(code)
    })
}

/// Exit status for a clap error.
pub fn usage_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => FATAL_EXIT_CODE,
    }
}

/// Default log level for the `--verbose` flag.
pub fn log_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Configuration from `UPKEEP_*` variables, with `workspace` taking
/// precedence over `UPKEEP_WORKSPACE`.
pub fn load_config(workspace: Option<PathBuf>) -> anyhow::Result<UpkeepConfig> {
    let mut config = UpkeepConfig::from_env()?;
    if let Some(root) = workspace {
        config = config.with_workspace_root(root);
    }
    Ok(config)
}

/// Process status for an error that reached `main`.
///
/// A failing check keeps its own status; every other error is fatal.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<SuiteError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<UpkeepError>() {
        e.exit_code()
    } else {
        FATAL_EXIT_CODE
    }
}

/// Print `err` with its causes and convert it to an exit status.
pub fn fail(err: anyhow::Error) -> ExitCode {
    eprintln!("error: {err:#}");
    ExitCode::from(exit_code_for(&err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_failure_keeps_its_status() {
        let err = anyhow::Error::from(SuiteError::CheckFailed {
            check: "test".to_string(),
            exit_code: 101,
        });
        assert_eq!(exit_code_for(&err), 101);
    }

    #[test]
    fn fatal_errors_exit_nine() {
        let unknown = anyhow::Error::from(SuiteError::UnknownCheck("lint".to_string()));
        assert_eq!(exit_code_for(&unknown), 9);

        let dirty = anyhow::Error::from(UpkeepError::DirtyWorkingTree {
            scope: "whole tree".to_string(),
            entries: vec![" M Cargo.lock".to_string()],
        });
        assert_eq!(exit_code_for(&dirty), 9);

        let other = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&other), 9);
    }

    #[test]
    fn context_does_not_hide_the_status() {
        let err = anyhow::Error::from(SuiteError::CheckFailed {
            check: "fmt".to_string(),
            exit_code: 1,
        })
        .context("running checks");
        assert_eq!(exit_code_for(&err), 1);
    }

    #[derive(Parser, Debug)]
    #[command(name = "demo", version = "1.0")]
    struct Demo {
        #[arg(long)]
        fix: bool,
    }

    #[test]
    fn usage_errors_are_fatal() {
        let err = Demo::try_parse_from(["demo", "--no-such-flag"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), FATAL_EXIT_CODE);
        assert!(parse_args_from::<Demo, _, _>(["demo", "--no-such-flag"]).is_err());
    }

    #[test]
    fn help_and_version_are_not_failures() {
        let help = Demo::try_parse_from(["demo", "--help"]).unwrap_err();
        assert_eq!(usage_exit_code(&help), 0);
        let version = Demo::try_parse_from(["demo", "--version"]).unwrap_err();
        assert_eq!(usage_exit_code(&version), 0);
    }

    #[test]
    fn valid_arguments_parse() {
        let demo = parse_args_from::<Demo, _, _>(["demo", "--fix"]).unwrap();
        assert!(demo.fix);
    }

    #[test]
    fn verbose_selects_debug() {
        assert_eq!(log_level(true), Level::DEBUG);
        assert_eq!(log_level(false), Level::INFO);
    }
}
