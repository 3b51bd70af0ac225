//! Logging - tracing subscriber setup for hosts embedding the connector

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_JSON: &str = "BEECONNECT_LOG_JSON";

/// Install a stderr subscriber. `RUST_LOG` filters (default `info`),
/// `BEECONNECT_LOG_JSON=1` switches to JSON lines. Safe to call twice.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var(ENV_LOG_JSON)
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
