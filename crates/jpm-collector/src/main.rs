//! Transcoding job event collector binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jpm_collector::{metrics, Collaborators, CollectorConfig, CollectorExecutor, EventCollector};
use jpm_media::{MediainfoProbe, ProbeConfig};
use jpm_storage::S3Client;
use jpm_store::{RedisEventSource, RedisStore};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("jpm=info".parse().expect("valid log directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting jpm-collector");

    if let Err(e) = run().await {
        error!("Collector failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Collector shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = CollectorConfig::from_env();
    info!("Collector config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr).context("Failed to start metrics exporter")?;
        info!("Prometheus metrics listening on {}", addr);
    }

    let s3 = S3Client::from_env().await.context("Failed to create S3 client")?;
    let probe_config = ProbeConfig::from_env(s3.url_expiration());
    let probe = MediainfoProbe::new(Arc::new(s3), probe_config).context("Failed to locate mediainfo")?;

    let store = Arc::new(RedisStore::from_env().context("Failed to create Redis store")?);
    let source = RedisEventSource::from_env().context("Failed to create event source")?;

    let collaborators = Collaborators::from_store(store, Arc::new(probe), &config.metric_stream);
    let executor = Arc::new(CollectorExecutor::new(
        EventCollector::new(config, collaborators),
        Arc::new(source),
    ));

    // Setup signal handler
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await.context("Executor error")?;
    Ok(())
}
