//! Worker process entry point: load configuration, connect Postgres, start
//! every pool, run until SIGINT, then drain gracefully.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use fulfillment_core::config::PipelineConfig;
use fulfillment_core::logging::init_structured_logging;
use fulfillment_core::persistence::PgMarketplaceStore;
use fulfillment_core::queue::PgQueueStore;
use fulfillment_core::runtime::{PipelineRuntime, Transports};
use fulfillment_core::test_helpers::{
    RecordingAnalyticsSink, RecordingCarrier, RecordingEmailSender, RecordingGateway,
    RecordingImageProcessor, RecordingPushSender, RecordingSearchIndexer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let config = PipelineConfig::load().context("loading pipeline configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("connecting to Postgres")?;

    let queue_store = Arc::new(PgQueueStore::new(pool.clone()));
    let store = Arc::new(PgMarketplaceStore::new(pool));

    // Stub transports until provider credentials are wired in deployment.
    // TODO: replace with the SMTP/Expo/iyzico/Aras clients from the services
    // repository once their configuration lands here.
    let transports = Transports {
        email: Arc::new(RecordingEmailSender::default()),
        push: Arc::new(RecordingPushSender::default()),
        gateway: Arc::new(RecordingGateway::default()),
        carrier: Arc::new(RecordingCarrier::default()),
        search: Arc::new(RecordingSearchIndexer::default()),
        analytics: Arc::new(RecordingAnalyticsSink::default()),
        images: Arc::new(RecordingImageProcessor::default()),
    };

    let mut runtime = PipelineRuntime::new(config, queue_store, store, transports)
        .context("constructing pipeline runtime")?;
    runtime.start();
    info!("fulfillment worker running, Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown signal received, draining in-flight jobs");
    runtime.shutdown().await;

    Ok(())
}
