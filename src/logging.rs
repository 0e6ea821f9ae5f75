//! Subscriber setup for the command line tool. The library only emits
//! `tracing` events; installing a subscriber is the binary's business.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "CLASS_WEAVER_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => {
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        }
        Err(_) => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}

/// Installs the global subscriber writing to stderr. A second call is a no-op.
pub fn init(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(env_filter());
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    // try_init fails only when a subscriber is already installed
    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init().ok(),
        LogFormat::Compact => registry.with(layer.compact()).try_init().ok(),
        LogFormat::Json => registry.with(layer.json()).try_init().ok(),
    };
}
