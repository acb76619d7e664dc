//! Global structured logging, initialized once from `main`.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. Defaults to `info` level, overridable via `RUST_LOG`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
