//! Diagnostic logging on stderr; stdout carries only the streamed reply.

use std::env;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "ARTIFACT_AGENT_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let directive = filter_directive(
        env::var(LOG_ENV_VAR).ok(),
        env::var(EnvFilter::DEFAULT_ENV).ok(),
    );
    let filter =
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn filter_directive(own: Option<String>, fallback: Option<String>) -> String {
    [own, fallback]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned())
}
