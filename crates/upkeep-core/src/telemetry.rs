//! Log setup shared by `upkeep` and `upkeep-checks`.
//!
//! Both binaries print their operator-facing result on stdout (the
//! pipeline report, `All testcases passed.`, the `--list` table) and
//! redirect tool output straight to the terminal. Log lines therefore
//! always go to stderr, where they interleave with the tools' own
//! diagnostics in the order things happened.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber for a binary.
///
/// `level` is what `--verbose` selects (`DEBUG` shows tool command lines
/// and settle polling, `INFO` shows stage transitions and checks).
/// `RUST_LOG` overrides it, e.g. `RUST_LOG=upkeep_core::process=debug`.
/// `json` switches to one JSON object per line for CI log collectors.
///
/// A subscriber installed earlier (a test harness, a second call) wins.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
}
