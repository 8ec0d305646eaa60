//! Tracing setup. Logs go to stderr; stdout belongs to the transport.

use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub fn init(cfg: &Config) {
    let level = cfg
        .get("RUNNER_LOG")
        .or_else(|| cfg.get("RUST_LOG"))
        .unwrap_or_else(|| "snippet_runner=info".to_string());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init();
}
