//! Standalone LinguaChat server binary. Run with --host, --port, and
//! --data-dir, or let settings.json / environment / defaults decide.

use std::path::PathBuf;

use common::config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = config::ensure_loaded().clone();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            config.port = args[i + 1].parse().unwrap_or(config.port);
            i += 2;
            continue;
        }
        if args[i] == "--host" && i + 1 < args.len() {
            config.host = args[i + 1].clone();
            i += 2;
            continue;
        }
        if args[i] == "--data-dir" && i + 1 < args.len() {
            config.data_dir = PathBuf::from(&args[i + 1]);
            i += 2;
            continue;
        }
        i += 1;
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server::run_web_server(&config))
}
