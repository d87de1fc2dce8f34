//! Datescape CLI - inspect and manage the response cache
//!
//! Opens the file-backed cache snapshot, runs one subcommand against it and
//! exits. A `get` miss exits with status 1.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use datescape::cache::{DurableStore, MemoryStore, ResponseCache};
use datescape::cli::{execute, Cli, Outcome};
use datescape::config::CacheConfig;

/// Sets up stderr logging; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "datescape=debug" } else { "datescape=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CacheConfig::from_cli(&cli);
    let store: Arc<dyn DurableStore> = match config.file_store() {
        Some(store) => Arc::new(store),
        None => {
            warn!("No cache directory available, cache will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let cache = ResponseCache::new(store, config.default_ttl, &config.storage_key);
    cache.load().await;

    let outcome = execute(&cli.command, &cache, &mut io::stdout().lock()).await?;

    Ok(match outcome {
        Outcome::Done => ExitCode::SUCCESS,
        Outcome::Miss => ExitCode::FAILURE,
    })
}
