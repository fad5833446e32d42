//! carscan CLI: run the producer, the consumer, or both locally.

use carscan::config::secrets::ExposeSecret;
use carscan::config::{Config, Protocol};
use carscan::db::Db;
use carscan::engine::{Consumer, ConsumerConfig, ConsumerReport, Producer, ProducerReport};
use carscan::output::FileSink;
use carscan::queue::{DiscoveryPolicy, MemoryQueue, OrderedQueue};
use carscan::store::{DirStore, StaticStore, Store};
use carscan::telemetry::{TelemetryConfig, init_telemetry};
use carscan::vision::{FixtureVision, HttpVision, Vision};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "carscan", about = "Queue-coordinated car image scanning")]
struct Cli {
    /// TOML file overriding the shared protocol constants
    #[arg(long, global = true)]
    protocol: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify the bucket and publish matching images
    Produce {
        /// Directory whose subdirectories act as buckets
        #[arg(long)]
        store_root: PathBuf,
        /// Canned vision results instead of VISION_ENDPOINT
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Drain the queue, read text, and write results
    Consume {
        /// Results file, opened in append mode
        #[arg(long, default_value = "output.txt")]
        output: PathBuf,
        /// Canned vision results instead of VISION_ENDPOINT
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Give up waiting for the queue after this many seconds
        #[arg(long, default_value_t = 300)]
        discovery_timeout_secs: u64,
        /// Flush and exit after this many seconds without a message
        #[arg(long)]
        idle_timeout_secs: Option<u64>,
    },
    /// Run producer and consumer in one process over an in-memory queue
    Local {
        /// Canned vision results; its image keys form the bucket unless
        /// --store-root is given
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        store_root: Option<PathBuf>,
        #[arg(long, default_value = "output.txt")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let protocol = Protocol::load_or_default(cli.protocol.as_deref())?;

    match cli.command {
        Command::Produce {
            store_root,
            fixture,
        } => cmd_produce(protocol, store_root, fixture).await,
        Command::Consume {
            output,
            fixture,
            discovery_timeout_secs,
            idle_timeout_secs,
        } => {
            let consumer_config = ConsumerConfig {
                discovery: DiscoveryPolicy {
                    max_wait: Duration::from_secs(discovery_timeout_secs),
                    ..DiscoveryPolicy::default()
                },
                idle_timeout: idle_timeout_secs.map(Duration::from_secs),
                ..ConsumerConfig::default()
            };
            cmd_consume(protocol, output, fixture, consumer_config).await
        }
        Command::Local {
            fixture,
            store_root,
            output,
        } => cmd_local(protocol, fixture, store_root, output).await,
    }
}

fn vision(config: &mut Config, fixture: Option<&Path>) -> anyhow::Result<Vision> {
    if let Some(path) = fixture {
        return Ok(Vision::Fixture(FixtureVision::load(path)?));
    }
    let endpoint = config
        .vision_endpoint
        .take()
        .ok_or_else(|| anyhow::anyhow!("VISION_ENDPOINT is not set and no --fixture given"))?;
    Ok(Vision::Http(HttpVision::new(
        endpoint,
        config.vision_api_key.take(),
    )?))
}

async fn connect(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    Ok(db)
}

async fn cmd_produce(
    protocol: Protocol,
    store_root: PathBuf,
    fixture: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "carscan-producer".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let vision = vision(&mut config, fixture.as_deref())?;
    let db = connect(&config).await?;
    let store = Store::Dir(DirStore::new(store_root));

    let report = produce(Arc::new(db), store, vision, protocol).await?;
    println!(
        "Published {} of {} scanned image(s) ({} duplicate)",
        report.published, report.scanned, report.duplicates
    );
    Ok(())
}

async fn cmd_consume(
    protocol: Protocol,
    output: PathBuf,
    fixture: Option<PathBuf>,
    consumer_config: ConsumerConfig,
) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "carscan-consumer".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let vision = vision(&mut config, fixture.as_deref())?;
    let db = connect(&config).await?;

    let report = consume(Arc::new(db), vision, &output, protocol, consumer_config).await?;
    print_consumer_report(&report, &output);
    Ok(())
}

async fn cmd_local(
    protocol: Protocol,
    fixture: PathBuf,
    store_root: Option<PathBuf>,
    output: PathBuf,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: std::env::var("OTEL_ENDPOINT").ok(),
        service_name: "carscan-local".to_string(),
        log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
    })?;

    let fixture = FixtureVision::load(&fixture)?;
    let store = match store_root {
        Some(root) => Store::Dir(DirStore::new(root)),
        None => Store::Static(StaticStore::new(fixture.keys().iter().cloned())),
    };
    let vision = Arc::new(Vision::Fixture(fixture));
    let queue = Arc::new(MemoryQueue::new());

    let producer = Producer::new(
        Arc::clone(&queue),
        Arc::new(store),
        Arc::clone(&vision),
        protocol.clone(),
    );
    let mut consumer = Consumer::new(
        Arc::clone(&queue),
        vision,
        FileSink::new(&output),
        protocol,
        ConsumerConfig::default(),
    );

    // A producer failure drops the consumer instead of leaving it waiting
    // for a sentinel that will never come.
    let (produced, consumed) = tokio::try_join!(producer.run(), consumer.run())?;
    println!(
        "Published {} of {} scanned image(s)",
        produced.published, produced.scanned
    );
    print_consumer_report(&consumed, &output);
    Ok(())
}

async fn produce<Q: OrderedQueue>(
    queue: Arc<Q>,
    store: Store,
    vision: Vision,
    protocol: Protocol,
) -> anyhow::Result<ProducerReport> {
    let producer = Producer::new(queue, Arc::new(store), Arc::new(vision), protocol);
    Ok(producer.run().await?)
}

async fn consume<Q: OrderedQueue>(
    queue: Arc<Q>,
    vision: Vision,
    output: &Path,
    protocol: Protocol,
    config: ConsumerConfig,
) -> anyhow::Result<ConsumerReport> {
    let mut consumer = Consumer::new(
        queue,
        Arc::new(vision),
        FileSink::new(output),
        protocol,
        config,
    );
    Ok(consumer.run().await?)
}

fn print_consumer_report(report: &ConsumerReport, output: &Path) {
    match report.flush_error {
        None => println!(
            "Results written to file {} ({} line(s) from {} image(s))",
            output.display(),
            report.results_written,
            report.processed
        ),
        Some(ref e) => eprintln!("An error occurred writing to {}: {e}", output.display()),
    }
}
