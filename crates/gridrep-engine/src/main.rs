use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gridrep_catalog::{DirCache, GridCatalog};
use gridrep_engine::cli::Cli;
use gridrep_engine::{GridConfig, OperationEngine};
use gridrep_storage::command::{CommandRunner, SubprocessRunner};
use gridrep_storage::disk::DiskBackend;
use gridrep_storage::tape::TapeBackend;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        GridConfig::from_file(&cli.config)?
    } else {
        tracing::warn!(
            "config file not found, using defaults: {}",
            cli.config.display()
        );
        GridConfig::default()
    };

    let registry = config.build_registry()?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SubprocessRunner);
    let cache = Arc::new(DirCache::new(config.cache_config()));
    let catalog = Arc::new(GridCatalog::new(
        Arc::clone(&runner),
        Arc::clone(&registry),
        config.catalog_prefix.clone(),
    ));

    let engine = OperationEngine::new(
        registry,
        catalog,
        Arc::new(DiskBackend::new(Arc::clone(&runner))),
        Arc::new(TapeBackend::new(runner)),
        cache,
        config.engine_config(),
    );

    let code = cli.run(&engine).await?;
    std::process::exit(code);
}
