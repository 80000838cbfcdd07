use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. Filter via `SARABI_LOG`
/// (default `info`). Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("SARABI_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .try_init();
}
