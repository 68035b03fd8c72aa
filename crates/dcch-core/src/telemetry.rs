//! Log output for the `dcch` binary.
//!
//! Harness crates log at the requested level while third-party crates stay
//! at `warn`, so a `--verbose` run shows stage transitions and compiler
//! invocations without runtime noise. `RUST_LOG` overrides both.
//!
//! Everything goes to stderr: stdout carries the suite report.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level.
const HARNESS_TARGETS: &[&str] = &["dcch_core", "dcch"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in HARNESS_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Returns `false` when one was already set.
///
/// With `json`, events are newline-delimited JSON carrying the current span
/// list, so every line of a run can be grouped by its `run_id`.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_list(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}
