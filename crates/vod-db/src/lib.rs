//! Transactional metadata store for originals and variants.
//!
//! Backed by PostgreSQL through sqlx. The unique constraint on
//! `(video_id, variant_name)` plus `ON CONFLICT .. DO UPDATE` makes the
//! variant write idempotent, which is what lets the broker redeliver jobs
//! safely.

pub mod error;
pub mod pool;
pub mod store;

use uuid::Uuid;

use vod_models::{
    NewOriginalVideo, OriginalVideo, ProcessedVariant, RequestContext, VariantUpsert, VideoStatus,
};

pub use error::{DbError, DbResult};
pub use pool::{connect_pool, default_max_connections};
pub use store::PgMetadataStore;

/// Capability set the pipeline needs from the metadata store.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert an ingestion record; returns the row with generated id and
    /// timestamps.
    async fn create_video(
        &self,
        ctx: &RequestContext,
        video: &NewOriginalVideo,
    ) -> DbResult<OriginalVideo>;

    async fn get_video(&self, ctx: &RequestContext, id: Uuid) -> DbResult<OriginalVideo>;

    async fn list_videos(&self, ctx: &RequestContext, user_id: Uuid)
        -> DbResult<Vec<OriginalVideo>>;

    async fn update_video(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> DbResult<OriginalVideo>;

    /// Delete the original; variants cascade at the database.
    async fn delete_video(&self, ctx: &RequestContext, id: Uuid) -> DbResult<()>;

    async fn update_status(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        status: VideoStatus,
    ) -> DbResult<()>;

    /// Backfill probed technical attributes of the source.
    async fn update_source_info(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        duration: i32,
        width: i32,
        height: i32,
    ) -> DbResult<()>;

    /// Insert-or-replace keyed by `(video_id, variant_name)`.
    async fn upsert_variant(
        &self,
        ctx: &RequestContext,
        variant: &VariantUpsert,
    ) -> DbResult<ProcessedVariant>;

    async fn list_variants(
        &self,
        ctx: &RequestContext,
        video_id: Uuid,
    ) -> DbResult<Vec<ProcessedVariant>>;
}
