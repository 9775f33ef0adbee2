//! Application state.

use std::sync::Arc;

use vod_broker::{Broker, BrokerConfig, RedisBroker};
use vod_config::AppConfig;
use vod_db::{connect_pool, MetadataStore, PgMetadataStore};
use vod_storage::{ObjectStore, S3Store, StorageConfig};

use crate::config::ApiConfig;
use crate::services::IngestService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub db: Arc<dyn MetadataStore>,
    pub broker: Arc<dyn Broker>,
    pub ingest: IngestService,
}

impl AppState {
    /// Wire the concrete adapters from the application config.
    pub async fn new(app: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let config = ApiConfig::from_app(app);

        let storage: Arc<dyn ObjectStore> = Arc::new(S3Store::new(StorageConfig {
            endpoint_url: app.minio.endpoint_url(),
            access_key_id: app.minio.access_key.clone(),
            secret_access_key: app.minio.secret_key.clone(),
            region: "us-east-1".to_string(),
        }));

        let pool = connect_pool(&app.database.url()).await?;
        let db: Arc<dyn MetadataStore> = Arc::new(PgMetadataStore::new(pool));

        let broker: Arc<dyn Broker> = Arc::new(RedisBroker::new(
            BrokerConfig::default().with_url(app.redis.url()),
        )?);

        let ingest = IngestService::new(
            Arc::clone(&storage),
            Arc::clone(&db),
            Arc::clone(&broker),
        );

        Ok(Self {
            config,
            storage,
            db,
            broker,
            ingest,
        })
    }
}
