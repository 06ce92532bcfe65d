// ABOUTME: Installs the global tracing subscriber used by the build daemon
// ABOUTME: RUST_LOG wins over the default directive when it is set

use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, Registry};

/// Returns false when a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
