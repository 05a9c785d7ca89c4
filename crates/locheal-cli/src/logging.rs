//! Tracing subscriber setup
//!
//! Log lines go to stderr so that reports on stdout stay machine readable.
//! `RUST_LOG` overrides the level picked from `-v`/`-q`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::LogFormatArg;
use crate::config::{CliConfig, ColorChoice};

/// Install the global subscriber; a second call is a no-op
pub fn init(config: &CliConfig, format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    let ansi = match config.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormatArg::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(ansi),
            )
            .try_init(),
        LogFormatArg::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init(),
    };
    if let Err(err) = result {
        tracing::debug!("tracing subscriber already installed: {err}");
    }
}
