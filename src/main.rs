mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use snippet_runner::{logging, server, Config, Engine};
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // CLI flags override config and environment
    let mut cfg = Config::load();
    if let Some(dir) = &args.dir {
        cfg.set("RUNNER_WORKING_DIR", dir.as_str());
    }
    if let Some(secs) = args.timeout {
        cfg.set("RUNNER_EXEC_TIMEOUT", secs.to_string());
    }
    if let Some(ext) = &args.external_dir {
        cfg.set("RUNNER_EXTERNAL_DIR", ext.as_str());
    }
    logging::init(&cfg);

    let engine = Arc::new(Engine::new(cfg.settings()));
    let root = engine
        .working_dir()
        .resolve()
        .with_context(|| format!("creating working directory {}", engine.settings().working_dir.display()))?;
    info!(dir = %root.display(), config = %cfg.config_path.display(), "snippet-runner ready");

    server::serve(engine, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
