//! # calnotify CLI
//!
//! Calendar event store with a notification scheduler and sender.
//!
//! Usage:
//!   calnotify run                      # Scheduler and sender in one process
//!   calnotify scheduler                # Scan and publish only
//!   calnotify sender                   # Consume and mark only
//!   calnotify config show              # Show configuration
//!   calnotify config init              # Write default configuration
//!   calnotify info                     # Show system info

use anyhow::{Context, Result};
use calnotify_core::CalNotifyConfig;
use calnotify_core::config::LoggingConfig;
use calnotify_core::traits::{EventStore, MessageQueue};
use calnotify_scheduler::Scheduler;
use calnotify_sender::Sender;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "calnotify",
    version,
    about = "Calendar event notifications: due-event scheduler and sender"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the sender together
    Run,

    /// Run only the scheduler (needs a queue shared across processes)
    Scheduler {
        /// Override the scan interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Run only the sender (needs a queue shared across processes)
    Sender,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system info
    Info,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(|p| std::path::PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(CalNotifyConfig::default_path);
    let mut config = CalNotifyConfig::load_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Run => {
            let store = open_store(&config).await?;
            let scheduler = Arc::new(Scheduler::new(
                config.scheduler.clone(),
                store.clone(),
                open_queue(&config).await?,
            ));
            let sender = Arc::new(Sender::new(store.clone(), open_queue(&config).await?));

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown_rx.clone()));
            let sender_task = tokio::spawn({
                let sender = sender.clone();
                async move { sender.run(shutdown_rx).await }
            });
            tracing::info!("calnotify is running, press Ctrl+C to stop");

            wait_for_signal(&shutdown_tx).await?;
            if let Err(e) = scheduler_task.await {
                tracing::error!("Scheduler task panicked: {e}");
            }
            match sender_task.await {
                Ok(Err(e)) => tracing::error!("Sender failed: {e}"),
                Err(e) => tracing::error!("Sender task panicked: {e}"),
                Ok(Ok(())) => {}
            }

            if let Err(e) = scheduler.shutdown().await {
                tracing::error!("Failed to stop scheduler: {e}");
            }
            if let Err(e) = sender.shutdown().await {
                tracing::error!("Failed to stop sender: {e}");
            }
            close_store(store).await;
        }

        Commands::Scheduler { interval } => {
            if let Some(secs) = interval {
                config.scheduler.interval_secs = secs;
                config.validate()?;
            }
            calnotify_queue::require_shared_broker(&config.queue)?;
            let store = open_store(&config).await?;
            let scheduler = Arc::new(Scheduler::new(
                config.scheduler.clone(),
                store.clone(),
                open_queue(&config).await?,
            ));

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn(scheduler.clone().run(shutdown_rx));
            tracing::info!("Scheduler is running...");

            wait_for_signal(&shutdown_tx).await?;
            if let Err(e) = task.await {
                tracing::error!("Scheduler task panicked: {e}");
            }
            if let Err(e) = scheduler.shutdown().await {
                tracing::error!("Failed to stop scheduler: {e}");
            }
            close_store(store).await;
        }

        Commands::Sender => {
            calnotify_queue::require_shared_broker(&config.queue)?;
            let store = open_store(&config).await?;
            let sender = Arc::new(Sender::new(store.clone(), open_queue(&config).await?));

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn({
                let sender = sender.clone();
                async move { sender.run(shutdown_rx).await }
            });
            tracing::info!("Sender is running...");

            wait_for_signal(&shutdown_tx).await?;
            match task.await {
                Ok(Err(e)) => tracing::error!("Sender failed: {e}"),
                Err(e) => tracing::error!("Sender task panicked: {e}"),
                Ok(Ok(())) => {}
            }
            if let Err(e) = sender.shutdown().await {
                tracing::error!("Failed to stop sender: {e}");
            }
            close_store(store).await;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let content = toml::to_string_pretty(&config)?;
                println!("{content}");
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                CalNotifyConfig::default().save_to(&config_path)?;
                println!("Configuration written to {}", config_path.display());
            }
        },

        Commands::Info => {
            println!("calnotify v{}", env!("CARGO_PKG_VERSION"));
            println!("   Platform: {} / {}", std::env::consts::OS, std::env::consts::ARCH);
            println!("   Config: {}", config_path.display());
            println!("   Storage: {}", config.storage.backend);
            if matches!(config.storage.backend.as_str(), "sqlite" | "sql") {
                println!("   Database: {}", config.storage.db_path().display());
            }
            println!(
                "   Retention: {:?}, {} months",
                config.storage.retention.policy, config.storage.retention.months
            );
            println!("   Queue: {} ({})", config.queue.name, config.queue.address);
            println!("   Scan interval: {}s", config.scheduler.interval().as_secs());
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        "calnotify=debug,calnotify_core=debug,calnotify_storage=debug,calnotify_queue=debug,calnotify_scheduler=debug,calnotify_sender=debug".to_string()
    } else {
        logging.level.clone()
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(config: &CalNotifyConfig) -> Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = Arc::from(calnotify_storage::create_store(&config.storage)?);
    store
        .connect()
        .await
        .with_context(|| format!("can not connect to {} storage", store.name()))?;
    Ok(store)
}

async fn open_queue(config: &CalNotifyConfig) -> Result<Arc<dyn MessageQueue>> {
    let queue: Arc<dyn MessageQueue> = Arc::from(calnotify_queue::create_queue(&config.queue)?);
    queue
        .connect()
        .await
        .with_context(|| format!("can not connect to queue at {}", config.queue.address))?;
    Ok(queue)
}

async fn close_store(store: Arc<dyn EventStore>) {
    if let Err(e) = store.close().await {
        tracing::error!("Failed to close storage: {e}");
    }
}

async fn wait_for_signal(shutdown: &watch::Sender<bool>) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown.send(true);
    Ok(())
}
