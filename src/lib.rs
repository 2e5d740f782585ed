pub mod auth;
pub mod config;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod server;
pub mod signals;
pub mod slug;
pub mod store;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging from the server configuration. RUST_LOG
/// overrides the configured level when set.
///
/// Note: This function can only be called once per process.
pub fn init_tracing(server: &config::ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if server.log_format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
