//! Logging setup for the runner binary.
//!
//! Everything goes to stderr: stdout carries protocol frames only.

use anyhow::Result;
use std::io;
use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Overrides `RUST_LOG` for the runner
pub const LOG_ENV_VAR: &str = "MCP_RUNNER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber. Later calls are no-ops.
///
/// `verbose` lowers the default level from `info` to `debug`; an explicit
/// filter in `MCP_RUNNER_LOG` or `RUST_LOG` always wins.
pub fn init(format: LogFormat, verbose: bool) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter(if verbose { "debug" } else { "info" });

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_ansi(false)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!(?format, "Logging initialized");
    });

    Ok(())
}

fn create_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(spec) = std::env::var(LOG_ENV_VAR) {
        return EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!("Invalid {LOG_ENV_VAR} specification '{spec}', using '{default_level}'");
            EnvFilter::new(default_level)
        });
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
