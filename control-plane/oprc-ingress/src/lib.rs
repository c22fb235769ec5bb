pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod key;
pub mod queue;
pub mod runtime;
pub mod templates;
pub mod web;

#[cfg(test)]
mod testing;

use tracing_subscriber::{
    EnvFilter,
    filter::{Directive, LevelFilter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence; `default_directive` applies only when it is
/// unset or empty. An unparsable default falls back to `info`.
pub fn init_tracing(default_directive: &str) {
    let fallback: Directive = default_directive
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::builder()
        .with_default_directive(fallback)
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
