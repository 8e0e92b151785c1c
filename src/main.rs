use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use ttlwatch::{
    ChangeFeedListener, Clock, ExpiryStore, JsonLinesAuditSink, PipelineConfig,
    SyntheticLoadGenerator, SystemClock, TieredBuckets, TtlPipeline, spawn_expiry_sweeper,
};

#[derive(Parser)]
#[command(name = "ttlwatch")]
#[command(about = "TTL bucketing and deletion-audit pipeline over an in-memory expiry store")]
struct Cli {
    /// JSON pipeline config; defaults apply to missing fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate entities, watch them expire and write audit logs
    Run {
        #[arg(long, default_value_t = 1000)]
        count: usize,
        #[arg(long, default_value = "audit")]
        audit_dir: PathBuf,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Generate entities into an in-memory store and report batching
    Generate {
        #[arg(long)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the effective configuration as JSON
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Run {
            count,
            audit_dir,
            duration_secs,
            seed,
        } => {
            if seed.is_some() {
                config.load.seed = seed;
            }
            run(config, count, audit_dir, duration_secs.map(Duration::from_secs)).await
        }
        Command::Generate { count, seed } => {
            if seed.is_some() {
                config.load.seed = seed;
            }
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let store = Arc::new(ExpiryStore::new(config.feed_capacity));
            let generator = SyntheticLoadGenerator::new(store.clone(), clock, config.load)
                .context("invalid load generator config")?;
            let report = generator.generate(count).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::PrintConfig => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(
    config: PipelineConfig,
    count: usize,
    audit_dir: PathBuf,
    duration: Option<Duration>,
) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(ExpiryStore::new(config.feed_capacity));
    let feed = store.subscribe().await;

    let sink = JsonLinesAuditSink::open(&audit_dir, config.no_of_objects)
        .await
        .with_context(|| format!("failed to open audit sink at {}", audit_dir.display()))?
        .with_sync_data(config.audit_sync_data);
    let pipeline = TtlPipeline::new(TieredBuckets::new(), sink, clock.clone(), &config)?;
    let listener = ChangeFeedListener::new(pipeline).spawn(feed);
    let sweeper = spawn_expiry_sweeper(store.clone(), &config.store, clock.clone());

    let generator = SyntheticLoadGenerator::new(store.clone(), clock, config.load.clone())?;
    let report = generator.generate(count).await?;
    info!(
        entities = report.entities,
        batches = report.batches,
        audit_dir = %audit_dir.display(),
        "load generated, watching for expiry"
    );

    match duration {
        Some(duration) => tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown_signal() => {}
        },
        None => shutdown_signal().await,
    }

    sweeper.stop().await;
    let stats = listener.shutdown().await.context("change feed listener failed")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ttlwatch=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "unable to install ctrl+c handler");
        std::future::pending::<()>().await;
    }
}
