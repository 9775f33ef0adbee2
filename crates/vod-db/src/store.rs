//! PostgreSQL metadata store implementation.

use std::future::Future;

use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use vod_models::{
    NewOriginalVideo, OriginalVideo, ProcessedVariant, RequestContext, VariantUpsert, VideoStatus,
};

use crate::error::{DbError, DbResult};
use crate::MetadataStore;

/// Metadata store backed by a shared [`PgPool`].
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `fut` under the context's cancellation token and deadline.
    async fn guard<T>(
        ctx: &RequestContext,
        fut: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        if ctx.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        match ctx.remaining() {
            Some(left) => tokio::select! {
                _ = ctx.cancel.cancelled() => Err(DbError::Cancelled),
                res = tokio::time::timeout(left, fut) => {
                    res.map_err(|_| DbError::Cancelled)?
                }
            },
            None => tokio::select! {
                _ = ctx.cancel.cancelled() => Err(DbError::Cancelled),
                res = fut => res,
            },
        }
    }
}

#[async_trait::async_trait]
impl MetadataStore for PgMetadataStore {
    async fn create_video(
        &self,
        ctx: &RequestContext,
        video: &NewOriginalVideo,
    ) -> DbResult<OriginalVideo> {
        let fut = async {
            let row = sqlx::query_as::<_, OriginalVideo>(
                r#"
                INSERT INTO original_videos
                    (user_id, filename, title, description, bucket, key,
                     file_size_bytes, content_type)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(video.user_id)
            .bind(&video.filename)
            .bind(&video.title)
            .bind(&video.description)
            .bind(&video.bucket)
            .bind(&video.key)
            .bind(video.file_size_bytes)
            .bind(&video.content_type)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from_query)?;

            debug!(video_id = %row.id, "created original video row");
            Ok(row)
        };
        Self::guard(ctx, fut).await
    }

    async fn get_video(&self, ctx: &RequestContext, id: Uuid) -> DbResult<OriginalVideo> {
        let fut = async {
            sqlx::query_as::<_, OriginalVideo>("SELECT * FROM original_videos WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::not_found(format!("video {id}")))
        };
        Self::guard(ctx, fut).await
    }

    async fn list_videos(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> DbResult<Vec<OriginalVideo>> {
        let fut = async {
            let rows = sqlx::query_as::<_, OriginalVideo>(
                "SELECT * FROM original_videos WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        };
        Self::guard(ctx, fut).await
    }

    async fn update_video(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        title: &str,
        description: &str,
    ) -> DbResult<OriginalVideo> {
        let fut = async {
            sqlx::query_as::<_, OriginalVideo>(
                r#"
                UPDATE original_videos
                SET title = $2, description = $3, updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(title)
            .bind(description)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("video {id}")))
        };
        Self::guard(ctx, fut).await
    }

    async fn delete_video(&self, ctx: &RequestContext, id: Uuid) -> DbResult<()> {
        let fut = async {
            let result = sqlx::query("DELETE FROM original_videos WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DbError::not_found(format!("video {id}")));
            }
            Ok(())
        };
        Self::guard(ctx, fut).await
    }

    async fn update_status(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        status: VideoStatus,
    ) -> DbResult<()> {
        let fut = async {
            let result = sqlx::query(
                "UPDATE original_videos SET status = $2, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(DbError::not_found(format!("video {id}")));
            }
            debug!(video_id = %id, status = %status, "updated video status");
            Ok(())
        };
        Self::guard(ctx, fut).await
    }

    async fn update_source_info(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        duration: i32,
        width: i32,
        height: i32,
    ) -> DbResult<()> {
        let fut = async {
            sqlx::query(
                r#"
                UPDATE original_videos
                SET duration = $2, width = $3, height = $4, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(duration)
            .bind(width)
            .bind(height)
            .execute(&self.pool)
            .await?;
            Ok(())
        };
        Self::guard(ctx, fut).await
    }

    async fn upsert_variant(
        &self,
        ctx: &RequestContext,
        variant: &VariantUpsert,
    ) -> DbResult<ProcessedVariant> {
        let fut = async {
            // The unique constraint does the dedup; no pre-query. A retry
            // of the same (video, variant) replaces every payload column.
            let row = sqlx::query_as::<_, ProcessedVariant>(
                r#"
                INSERT INTO video_variants
                    (video_id, variant_name, bucket, key, content_type,
                     hls_playlist_key, thumbnail_key, width, height, bitrate_kbps)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (video_id, variant_name) DO UPDATE SET
                    bucket = EXCLUDED.bucket,
                    key = EXCLUDED.key,
                    content_type = EXCLUDED.content_type,
                    hls_playlist_key = EXCLUDED.hls_playlist_key,
                    thumbnail_key = EXCLUDED.thumbnail_key,
                    width = EXCLUDED.width,
                    height = EXCLUDED.height,
                    bitrate_kbps = EXCLUDED.bitrate_kbps
                RETURNING *
                "#,
            )
            .bind(variant.video_id)
            .bind(&variant.variant_name)
            .bind(&variant.bucket)
            .bind(&variant.key)
            .bind(&variant.content_type)
            .bind(&variant.hls_playlist_key)
            .bind(&variant.thumbnail_key)
            .bind(variant.width)
            .bind(variant.height)
            .bind(variant.bitrate_kbps)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from_query)?;

            debug!(
                video_id = %row.video_id,
                variant = %row.variant_name,
                "upserted variant row"
            );
            Ok(row)
        };
        Self::guard(ctx, fut).await
    }

    async fn list_variants(
        &self,
        ctx: &RequestContext,
        video_id: Uuid,
    ) -> DbResult<Vec<ProcessedVariant>> {
        let fut = async {
            let rows = sqlx::query_as::<_, ProcessedVariant>(
                "SELECT * FROM video_variants WHERE video_id = $1 ORDER BY variant_name",
            )
            .bind(video_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        };
        Self::guard(ctx, fut).await
    }
}
