//! wbt entry point.
//!
//! This file is intentionally thin: it sets up tracing, reads the env
//! config, builds the shared coordinator, and dispatches the CLI
//! commands. All run logic lives in the library modules.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use wbt_client::TariffApiClient;
use wbt_export::LogExporter;
use wbt_sync::config::SyncConfig;
use wbt_sync::coordinator::SyncCoordinator;
use wbt_sync::scheduler;

#[derive(Parser)]
#[command(name = "wbt")]
#[command(about = "Warehouse box-tariff sync service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled service: startup sync, then cron-driven cycles.
    Serve,

    /// Run exactly one sync cycle and exit.
    SyncOnce,

    /// Export today's rows unconditionally and exit.
    ExportOnce,

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.cmd {
        Commands::Serve => serve(config).await,
        Commands::SyncOnce => {
            let coordinator = build_coordinator(&config).await?;
            let outcome = coordinator.run_once().await?;
            info!(?outcome, "sync finished");
            Ok(())
        }
        Commands::ExportOnce => {
            let coordinator = build_coordinator(&config).await?;
            let rows = coordinator.export_day().await?;
            info!(rows, "export finished");
            Ok(())
        }
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => {
                let pool = wbt_db::connect_from_env().await?;
                let st = wbt_db::status(&pool).await?;
                println!(
                    "db ok={} warehouse_tables={}",
                    st.ok, st.has_warehouse_tables
                );
                Ok(())
            }
            DbCmd::Migrate => {
                let pool = wbt_db::connect_from_env().await?;
                wbt_db::migrate(&pool).await?;
                println!("migrations applied");
                Ok(())
            }
        },
    }
}

async fn build_coordinator(config: &SyncConfig) -> Result<Arc<SyncCoordinator>> {
    anyhow::ensure!(
        !config.database_url.is_empty(),
        "missing env var {}",
        wbt_db::ENV_DB_URL
    );
    let pool = wbt_db::connect(&config.database_url).await?;

    let client = TariffApiClient::new(config.tariff_api_url.clone(), config.api_token.clone());
    Ok(Arc::new(SyncCoordinator::new(
        pool,
        Arc::new(client),
        Arc::new(LogExporter),
    )))
}

async fn serve(config: SyncConfig) -> Result<()> {
    let coordinator = build_coordinator(&config).await?;

    // Startup run, then hand over to the cron schedules.
    coordinator.run_scheduled().await;

    match scheduler::maybe_build_scheduler(Arc::clone(&coordinator), &config).await? {
        Some(sched) => {
            sched.start().await.context("starting scheduler")?;
            info!("wbt serving; press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("ctrl-c handler")?;
            info!("shutdown requested");
        }
        None => {
            info!("scheduling disabled, nothing to serve");
        }
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
