//! KOL Trend Indicator
//!
//! Periodically classifies tracked authors' posts and serves the rolling
//! three-day BTC trend indicator.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use kol_indicator::{
    aggregator::ScoreAggregator,
    classifier::LlmClassifier,
    config::Config,
    credibility::CredibilityTable,
    notify::Notifier,
    price::BinancePriceFeed,
    processor::{BatchProcessor, SweepOutcome},
    relevance::RelevanceFilter,
    storage::Database,
    types::Post,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kol-indicator")]
#[command(about = "Classify KOL posts and aggregate a rolling BTC trend indicator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep unprocessed posts on a timer until Ctrl-C
    Run,
    /// Run a single sweep and print its report
    Sweep,
    /// Print the current three-day indicator
    Indicator,
    /// Show today's predictions with their posts
    Recent {
        /// Maximum rows to show
        #[arg(short, long, default_value = "30")]
        limit: i64,
    },
    /// Load posts from a JSON array file
    Import {
        /// Path to the JSON file
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Sweep => sweep_once(config).await,
        Commands::Indicator => show_indicator(config).await,
        Commands::Recent { limit } => show_recent(config, limit).await,
        Commands::Import { file } => import_posts(config, &file).await,
    }
}

fn build_processor(config: &Config, db: Arc<Database>) -> anyhow::Result<BatchProcessor> {
    let classifier = LlmClassifier::from_config(&config.llm, &config.processor)?;
    let price_feed = BinancePriceFeed::from_config(&config.price)?;

    Ok(BatchProcessor::new(
        db.clone(),
        db,
        Arc::new(classifier),
        RelevanceFilter::new(&config.processor.keywords),
        config.processor.batch_size,
    )
    .with_price_feed(Arc::new(price_feed), config.price.fallback)
    .with_notifier(Notifier::from_config(config.telegram.as_ref())))
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting KOL indicator");

    let db = Arc::new(Database::connect(&config.database.path).await?);
    let processor = Arc::new(build_processor(&config, db)?);
    let notifier = Notifier::from_config(config.telegram.as_ref());

    if let Err(e) = notifier.startup(config.processor.interval_secs).await {
        tracing::warn!("Startup notification failed: {}", e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(
        Arc::clone(&processor).run(config.processor.interval(), shutdown_rx),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send(true).ok();
    handle.await?;

    if processor.is_running() {
        tracing::warn!("Stopping with a sweep in progress; its pending post stays unprocessed");
    }

    if let Err(e) = notifier.shutdown("Ctrl-C").await {
        tracing::warn!("Shutdown notification failed: {}", e);
    }

    Ok(())
}

async fn sweep_once(config: Config) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let processor = build_processor(&config, db)?;

    match processor.sweep().await? {
        SweepOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        SweepOutcome::Skipped => println!("Sweep skipped: another sweep is running"),
    }

    Ok(())
}

async fn show_indicator(config: Config) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let credibility = CredibilityTable::from_config(&config.kols);
    tracing::debug!("Weighting {} tracked KOLs", credibility.count());
    let aggregator = ScoreAggregator::new(db, credibility);

    let indicator = aggregator.indicator(Utc::now()).await;
    println!("{}", serde_json::to_string_pretty(&indicator)?);

    Ok(())
}

async fn show_recent(config: Config, limit: i64) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    let today = Utc::now().date_naive();

    let recent = db.recent_predictions(today, limit).await?;
    println!("{}", serde_json::to_string_pretty(&recent)?);

    Ok(())
}

async fn import_posts(config: Config, file: &str) -> anyhow::Result<()> {
    let path = shellexpand::tilde(file);
    let raw = tokio::fs::read_to_string(path.as_ref())
        .await
        .with_context(|| format!("reading {}", file))?;
    let posts: Vec<Post> = serde_json::from_str(&raw).context("parsing posts")?;

    let db = Database::connect(&config.database.path).await?;
    let mut inserted = 0usize;
    for post in &posts {
        if db.upsert_post(post).await? {
            inserted += 1;
        }
    }

    tracing::info!(
        "Imported {} posts ({} new, {} updated)",
        posts.len(),
        inserted,
        posts.len() - inserted
    );

    Ok(())
}
