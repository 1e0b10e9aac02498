//! Tracing setup for the `capsynth` binary.
//!
//! Script output (`print`/`debug` from generated modules) is logged under the
//! `capsynth::script` target. It stays quiet unless the chosen level is
//! `DEBUG` or finer, or `RUST_LOG` asks for it.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const SCRIPT_TARGET: &str = "capsynth::script";

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    if level >= Level::DEBUG {
        level.as_str().to_lowercase()
    } else {
        format!("{},{SCRIPT_TARGET}=warn", level.as_str().to_lowercase())
    }
}

/// Install the global subscriber. Only the first call in a process wins.
///
/// Human-readable output goes to stderr so command output on stdout stays
/// clean; `json` switches to newline-delimited JSON records.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(level >= Level::DEBUG)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_output_is_muted_at_info() {
        assert_eq!(default_directives(Level::INFO), "info,capsynth::script=warn");
    }

    #[test]
    fn debug_level_shows_everything() {
        assert_eq!(default_directives(Level::DEBUG), "debug");
        assert_eq!(default_directives(Level::TRACE), "trace");
    }
}
