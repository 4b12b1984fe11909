use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backup_core::{CycleRunner, NoUpdateCheck, TriggerOutcome, settings};
use backup_utils::{DEFAULT_CONFIG_PATH, ensure_dir, runtime_paths, service_dir};

mod install;
mod lifecycle;
mod lock;
mod logs;

#[derive(Parser)]
#[command(name = "valheim-backupd")]
#[command(about = "Scheduled world backups for a Valheim dedicated server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up now, then keep backing up on the configured schedule
    Run {
        /// Service config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Run a single backup cycle and exit
    Once {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print the effective settings as JSON
    Config {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Install and enable the systemd unit
    Install {
        /// Account the service runs as (defaults to SUDO_USER)
        #[arg(long)]
        user: Option<String>,
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Disable and remove the systemd unit
    Uninstall,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let sink = logs::LogSink::open(&service_dir());
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(sink.writer())
                .init();
            run(config).await
        }
        Commands::Once { config } => {
            init_stderr_logging();
            once(config).await
        }
        Commands::Config { config } => {
            init_stderr_logging();
            let settings = settings::load(&config);
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Install { user, config } => {
            init_stderr_logging();
            install::install(user, &config)
        }
        Commands::Uninstall => {
            init_stderr_logging();
            install::uninstall()
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: PathBuf) -> Result<()> {
    let paths = runtime_paths();
    ensure_dir(&paths.runtime_dir).context("Failed to create runtime dir")?;

    // single-instance lock
    let _guard = match lock::acquire_lock(&paths.lock_path) {
        Ok(guard) => guard,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            warn!(
                "backup daemon already running ({}), exiting",
                lock::held_by(&paths.lock_path)
            );
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to acquire daemon lock"),
    };

    let mut service = lifecycle::BackupService::new(config, lifecycle::reporter_from_env());
    service.on_start().await;

    shutdown_signal().await;
    info!("shutdown requested");
    service.on_stop().await;
    Ok(())
}

async fn once(config: PathBuf) -> Result<()> {
    let paths = runtime_paths();
    ensure_dir(&paths.runtime_dir).context("Failed to create runtime dir")?;
    let _guard = match lock::acquire_lock(&paths.lock_path) {
        Ok(guard) => guard,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            return Err(anyhow!(
                "backup daemon is running ({}); it owns the backup root",
                lock::held_by(&paths.lock_path)
            ));
        }
        Err(e) => return Err(e).context("Failed to acquire daemon lock"),
    };

    let runner = CycleRunner::new(settings::load(&config), Arc::new(NoUpdateCheck));
    match runner.trigger(chrono::Local::now().naive_local()).await {
        TriggerOutcome::Completed(report) => {
            println!("{}", report.snapshot.dir.path.display());
            for evicted in &report.evicted {
                println!("removed {}", evicted.path.display());
            }
            Ok(())
        }
        TriggerOutcome::Failed(err) => Err(err).context("Backup cycle failed"),
        TriggerOutcome::Skipped => Err(anyhow!("backup cycle already in progress")),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(err) => warn!("failed to install SIGTERM handler: {err}"),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
    }
}
