//! Log output of the `shoov` binary.
//!
//! Everything goes to stderr: stdout is reserved for the regression link
//! (or the `--report-json` document) that CI scripts capture.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber for a reporting run.
///
/// `json` selects one JSON object per line (the CLI's `--json`). `level`
/// applies when `RUST_LOG` is unset; the CLI passes `DEBUG` for `--verbose`
/// or `debug = true` in `~/.shoov.json`. A subscriber installed earlier (a
/// test harness, a second call) is left in place.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (text, json_lines) = if json {
        let lines = fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(false)
            .with_writer(std::io::stderr);
        (None, Some(lines))
    } else {
        let lines = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (Some(lines), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json_lines)
        .try_init()
        .ok();
}
