//! # Dripcast — drip-campaign delivery bot
//!
//! Registers subscribers over Telegram and delivers each configured message
//! once its delay after registration has elapsed.
//!
//! Usage:
//!   dripcast                           # Run with ~/.dripcast/config.toml
//!   dripcast --config ./dripcast.toml  # Custom config
//!   dripcast --init-db                 # Create the schema and exit

use anyhow::Result;
use clap::Parser;
use dripcast_bot::Bot;
use dripcast_channels::TelegramChannel;
use dripcast_core::clock::SystemClock;
use dripcast_core::{DripcastConfig, RecordStore};
use dripcast_db::SqliteStore;
use dripcast_scheduler::SchedulerEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dripcast",
    version,
    about = "💧 Dripcast — drip-campaign delivery bot"
)]
struct Cli {
    /// Config file (default: ~/.dripcast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Seconds between delivery ticks (overrides config)
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Create the database schema and exit
    #[arg(long)]
    init_db: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "dripcast=debug,dripcast_scheduler=debug,dripcast_bot=debug,dripcast_db=debug,dripcast_channels=debug"
    } else {
        "dripcast=info,dripcast_scheduler=info,dripcast_bot=info,dripcast_db=info,dripcast_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Load config: file, then env, then CLI
    let mut config = match &cli.config {
        Some(path) => DripcastConfig::load_from(path)?,
        None => DripcastConfig::load()?,
    }
    .with_env_overrides();
    if let Some(db_path) = &cli.db_path {
        config.database.path = db_path.clone();
    }
    if let Some(secs) = cli.tick_secs {
        config.scheduler.tick_interval_secs = secs;
    }

    // Schema first, before anything can read or write records
    let db_path = expand_path(&config.database.path);
    let store = Arc::new(SqliteStore::open(Path::new(&db_path))?);
    store.init_schema().await?;

    if cli.init_db {
        let (recipients, messages, deliveries) = store.counts()?;
        println!("✅ Database ready: {db_path}");
        println!("   Recipients: {recipients}");
        println!("   Messages:   {messages}");
        println!("   Deliveries: {deliveries}");
        return Ok(());
    }

    config.validate()?;

    let telegram = Arc::new(TelegramChannel::new(config.telegram.clone()));
    let me = telegram.get_me().await?;
    tracing::info!(
        "🤖 Telegram bot: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    // Delivery engine
    let engine = Arc::new(SchedulerEngine::from_config(
        store.clone(),
        telegram.clone(),
        &config.scheduler,
    ));
    let scheduler = engine.start();

    // Front-end
    let shutdown = CancellationToken::new();
    let events = telegram.start_polling(shutdown.child_token());
    let bot = Bot::new(
        store.clone(),
        telegram.clone(),
        Arc::new(SystemClock),
        config.bot.clone(),
        config.scheduler.min_delay_hours,
    );

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        tracing::info!("🛑 Shutdown requested");
        ctrl_c.cancel();
    });

    println!("💧 Dripcast v{}", env!("CARGO_PKG_VERSION"));
    println!("   Database: {db_path}");
    println!("   Tick:     every {}s", config.scheduler.tick_interval_secs);

    bot.run(events, shutdown.clone()).await;

    // Polling may also end on its own; make sure everything winds down
    shutdown.cancel();
    scheduler.stop().await;
    tracing::info!("👋 Dripcast stopped");
    Ok(())
}
