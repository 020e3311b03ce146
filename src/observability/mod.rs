//! Structured logging setup using the tracing ecosystem.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter; the default keeps bagplane at
/// `info` and quiets the gRPC stack.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,h2=warn,tonic=info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
