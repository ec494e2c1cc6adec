//! modqueue CLI: supervise the moderation service fleet and maintain the
//! similarity indexes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use modqueue::config::{Config, Credentials, LogFormat};
use modqueue::embedding::HttpEmbeddingClient;
use modqueue::index::{IndexManager, PartitionKey};
use modqueue::store::{DocumentSource, HttpDocumentStore};
use modqueue::supervisor::{
    Health, HealthProbe, HttpHealthChecker, ProcessLauncher, Scheduler, ServiceSupervisor,
};

#[derive(Parser)]
#[command(name = "modqueue")]
#[command(about = "Automated content-moderation queue coordinator")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service fleet and the daily processing scheduler
    Start {
        /// Show the status of configured services instead of starting
        #[arg(long)]
        status: bool,
    },

    /// One-time setup tasks
    Setup {
        /// Build and persist similarity indexes for configured collections
        #[arg(long)]
        build_indexes: bool,
    },

    /// Write a default configuration file
    Init {
        /// Target path (defaults to the standard config location)
        path: Option<PathBuf>,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter_directive()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load(p),
        None => {
            let default = Config::default_path();
            if default.exists() {
                Config::load(&default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Start { status: true } => cmd_status(&config).await,
        Commands::Start { status: false } => cmd_start(&config).await,
        Commands::Setup { build_indexes: true } => cmd_build_indexes(&config).await,
        Commands::Setup { build_indexes: false } => {
            anyhow::bail!("nothing to do: pass --build-indexes")
        }
        Commands::Init { path } => cmd_init(path),
    }
}

/// Start the fleet, schedule the daily run, block until interrupted.
async fn cmd_start(config: &Config) -> Result<()> {
    let credentials = Credentials::load(&Config::credentials_path())
        .context("Cannot start without platform credentials")?;

    let probe = Arc::new(HttpHealthChecker::new(Duration::from_secs(
        config.supervisor.probe_timeout_secs,
    ))?);
    let supervisor = Arc::new(ServiceSupervisor::new(
        config.supervisor.clone(),
        Arc::new(ProcessLauncher),
        probe,
        credentials.as_env(),
    ));

    supervisor.start(&config.services).await?;
    for (name, state) in supervisor.status() {
        info!(service = %name, state = %state, "service up");
    }

    let scheduler = Scheduler::new();
    let store = Arc::new(HttpDocumentStore::new(&config.store)?);
    let collections = config.index.collections.clone();
    let job_store = store.clone();
    let job_credentials = credentials.clone();
    let job: modqueue::supervisor::DailyJob = Arc::new(move || {
        let store = job_store.clone();
        let credentials = job_credentials.clone();
        let collections = collections.clone();
        Box::pin(async move { store.trigger_processing(&credentials, &collections).await })
    });
    scheduler.schedule(
        config.scheduled_time()?,
        Duration::from_secs(config.scheduler.tick_interval_secs),
        job,
    );

    wait_for_interrupt().await;
    info!("interrupt received, shutting down");

    // Scheduler first so no new job starts, then the fleet in reverse
    // start order.
    scheduler.cancel();
    supervisor.shutdown_all().await;
    Ok(())
}

/// Probe each configured service once and print the result.
async fn cmd_status(config: &Config) -> Result<()> {
    let probe = HttpHealthChecker::new(Duration::from_secs(
        config.supervisor.probe_timeout_secs,
    ))?;

    println!("Service status:");
    for spec in &config.services {
        let marker = match probe.probe(spec).await {
            Health::Healthy => "running",
            Health::Unhealthy => "unhealthy",
            Health::Unreachable => "not running",
        };
        println!("  {:<16} port {:<6} {}", spec.name, spec.port, marker);
    }
    Ok(())
}

/// Build one partition per configured (collection, content type) pair and
/// persist the result.
async fn cmd_build_indexes(config: &Config) -> Result<()> {
    if config.index.collections.is_empty() {
        anyhow::bail!("no collections configured; add [index] collections to the config file");
    }

    let embedder = Arc::new(HttpEmbeddingClient::new(&config.embedding)?);
    let index_manager = IndexManager::new(embedder, config.index.clone());
    let store = HttpDocumentStore::new(&config.store)?;

    for collection in &config.index.collections {
        for &content_type in &config.index.content_types {
            let documents = store.fetch(collection, content_type).await?;
            if documents.is_empty() {
                warn!(%collection, %content_type, "no documents, skipping partition");
                continue;
            }

            let index_docs: Vec<_> = documents.iter().map(|d| d.to_index_document()).collect();
            let key = PartitionKey::new(collection.clone(), content_type);
            info!(%key, documents = index_docs.len(), "building partition");
            index_manager.build(key, &index_docs).await?;
        }
    }

    let index_dir = config.data_dir.join("indexes");
    index_manager.save(&index_dir)?;
    info!(dir = %index_dir.display(), "indexes built and saved");
    Ok(())
}

/// Write a default config file without clobbering an existing one.
fn cmd_init(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(Config::default_path);
    if path.exists() {
        anyhow::bail!("config already exists at {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let rendered = toml::to_string_pretty(&Config::default())?;
    std::fs::write(&path, rendered)?;
    println!("Wrote default config to {}", path.display());
    println!(
        "Place platform credentials at {}",
        Config::credentials_path().display()
    );
    Ok(())
}

async fn wait_for_interrupt() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = wait_for_sigterm() => {}
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
