//! Log output for programs built on [`CliApp`](crate::CliApp).
//!
//! The library itself only emits events: schema builds and rejected definitions at
//! `debug`, per-record conversions and derived tables at `trace`, subprocess launches
//! and config file reads at `debug`. Nothing is printed unless a subscriber is installed,
//! either by the host program or by [`init_tracing`].

use std::env;
use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Crate-specific filter variable, consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "FANCY_RECORD_LOG";
const QUIET_FILTER: &str = "fancy_record=warn";

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid log filter `{directive}`: {source}")]
    InvalidFilter {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("another tracing subscriber is already installed: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Sends compact, target-less lines to stderr so a command's stdout stays clean.
///
/// The filter comes from `FANCY_RECORD_LOG`, then `RUST_LOG`, then `fancy_record=warn`.
/// A malformed directive in either variable is reported rather than ignored.
pub fn init_tracing() -> Result<(), TelemetryInitError> {
    init_tracing_with(QUIET_FILTER)
}

/// [`init_tracing`] with a different last-resort filter.
pub fn init_tracing_with(fallback: &str) -> Result<(), TelemetryInitError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let directive = pick_directive(env::var(LOG_ENV).ok(), env::var("RUST_LOG").ok(), fallback);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|source| TelemetryInitError::InvalidFilter { directive, source })?;
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    let _ = INSTALLED.set(());
    Ok(())
}

fn pick_directive(own: Option<String>, rust_log: Option<String>, fallback: &str) -> String {
    [own, rust_log]
        .into_iter()
        .flatten()
        .map(|directive| directive.trim().to_string())
        .find(|directive| !directive.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_variable_wins_over_rust_log() {
        let picked = pick_directive(
            Some("fancy_record=trace".into()),
            Some("info".into()),
            QUIET_FILTER,
        );
        assert_eq!(picked, "fancy_record=trace");
        assert_eq!(pick_directive(None, Some("info".into()), QUIET_FILTER), "info");
    }

    #[test]
    fn blank_variables_fall_through() {
        assert_eq!(
            pick_directive(Some("  ".into()), Some(String::new()), QUIET_FILTER),
            QUIET_FILTER
        );
    }
}
