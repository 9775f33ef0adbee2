//! Processing worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vod_broker::{Broker, BrokerConfig, RedisBroker};
use vod_config::AppConfig;
use vod_db::{connect_pool, MetadataStore, PgMetadataStore};
use vod_media::{check_ffmpeg, FfmpegTransformer, MediaTransformer};
use vod_models::RequestContext;
use vod_storage::{ObjectStore, S3Store, StorageConfig};
use vod_worker::{Consumer, JobDeps, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vod=info".parse().unwrap()))
        .init();

    info!("starting vod-worker");

    if let Err(e) = check_ffmpeg() {
        error!("transcoder unavailable: {}", e);
        std::process::exit(1);
    }

    let app = match AppConfig::load_from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let config = WorkerConfig::from_env();
    info!(consumer = %config.consumer_name, "worker config loaded");

    let storage: Arc<dyn ObjectStore> = Arc::new(S3Store::new(StorageConfig {
        endpoint_url: app.minio.endpoint_url(),
        access_key_id: app.minio.access_key.clone(),
        secret_access_key: app.minio.secret_key.clone(),
        region: "us-east-1".to_string(),
    }));

    let pool = match connect_pool(&app.database.url()).await {
        Ok(p) => p,
        Err(e) => {
            error!("failed to connect database pool: {}", e);
            std::process::exit(1);
        }
    };
    let db: Arc<dyn MetadataStore> = Arc::new(PgMetadataStore::new(pool));

    let broker: Arc<dyn Broker> = match RedisBroker::new(
        BrokerConfig::default().with_url(app.redis.url()),
    ) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!("failed to create broker client: {}", e);
            std::process::exit(1);
        }
    };

    let media: Arc<dyn MediaTransformer> = Arc::new(FfmpegTransformer::new());

    let consumer = Consumer::new(
        config,
        broker,
        JobDeps { storage, db, media },
    );

    // Process-lifetime context; shutdown cancels reads, in-flight
    // subprocesses and workers.
    let ctx = RequestContext::new();
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    });

    if let Err(e) = consumer.run(ctx).await {
        error!("consumer error: {}", e);
        std::process::exit(1);
    }

    info!("worker shutdown complete");
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate.recv() => {},
    }
}
