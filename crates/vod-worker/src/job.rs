//! Per-job processing pipeline.
//!
//! One job = one scoped working directory, one source download, a worker
//! per variant, a single result router, and a fixed pool of upload
//! workers draining a bounded channel. Join order: variant workers, then
//! the router (result channel closes), then the upload pool (upload
//! channel closes), then workdir removal, and only then is the broker
//! message eligible for acknowledgement.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use vod_db::MetadataStore;
use vod_media::MediaTransformer;
use vod_models::{JobEvent, RequestContext, VideoStatus, VARIANTS};
use vod_storage::ObjectStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::variant::{process_variant, UploadTask, VariantJob, VariantResult};

/// The collaborators a job needs.
pub struct JobDeps {
    pub storage: Arc<dyn ObjectStore>,
    pub db: Arc<dyn MetadataStore>,
    pub media: Arc<dyn MediaTransformer>,
}

/// Per-variant tally of a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// Variants whose files were routed and whose row was upserted
    pub succeeded: usize,
    /// Variants that failed anywhere in their pipeline
    pub failed: usize,
}

/// Process one job event end to end.
///
/// Errors returned here are the fatal kind (working directory, source
/// download): the caller must not acknowledge, so the broker redelivers.
/// Per-variant failures never surface as errors.
pub async fn process_job(
    deps: &JobDeps,
    config: &WorkerConfig,
    ctx: &RequestContext,
    event: &JobEvent,
) -> WorkerResult<JobOutcome> {
    // Fresh per attempt; redelivery writes under a new prefix and the
    // variant upsert collapses the rows.
    let results_prefix = format!("processed/{}", Uuid::new_v4());

    tokio::fs::create_dir_all(&config.work_dir).await?;
    let work_dir = tempfile::Builder::new()
        .prefix("video-job-")
        .tempdir_in(&config.work_dir)?;

    info!(
        video_id = %event.video_id,
        source = %event.key,
        work_dir = %work_dir.path().display(),
        "starting video processing"
    );

    if let Err(e) = deps
        .db
        .update_status(ctx, event.video_id, VideoStatus::Processing)
        .await
    {
        warn!(video_id = %event.video_id, "failed to mark video processing: {e}");
    }

    let source_path = work_dir
        .path()
        .join(format!("source{}", source_extension(&event.key)));
    deps.storage
        .download(ctx, &event.bucket, &event.key, &source_path)
        .await?;

    match deps.media.probe(ctx, &source_path).await {
        Ok(probe) => {
            if let Err(e) = deps
                .db
                .update_source_info(
                    ctx,
                    event.video_id,
                    probe.duration.round() as i32,
                    probe.width as i32,
                    probe.height as i32,
                )
                .await
            {
                warn!(video_id = %event.video_id, "failed to record source info: {e}");
            }
        }
        Err(e) => warn!(video_id = %event.video_id, "source probe failed: {e}"),
    }

    let (result_tx, mut result_rx) = mpsc::channel::<VariantResult>(VARIANTS.len());
    let (upload_tx, upload_rx) = mpsc::channel::<UploadTask>(config.upload_queue);

    // Fixed upload pool sharing one receiver.
    let upload_rx = Arc::new(Mutex::new(upload_rx));
    let mut upload_handles = Vec::with_capacity(config.upload_workers);
    for _ in 0..config.upload_workers {
        let rx = Arc::clone(&upload_rx);
        let storage = Arc::clone(&deps.storage);
        let ctx = ctx.clone();
        upload_handles.push(tokio::spawn(async move {
            loop {
                let task = { rx.lock().await.recv().await };
                let Some(task) = task else { break };
                match storage
                    .upload(
                        &ctx,
                        &task.bucket,
                        &task.object_key,
                        &task.local_path,
                        &task.content_type,
                    )
                    .await
                {
                    Ok(()) => info!(object = %task.object_key, "upload successful"),
                    Err(e) => error!(object = %task.object_key, "upload failed: {e}"),
                }
            }
        }));
    }

    // Result router: single owner of the result receive side and the
    // upload send side. Within a variant the upload enqueue happens
    // before the metadata upsert; across variants order is arrival order.
    let router = {
        let db = Arc::clone(&deps.db);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut succeeded = 0usize;
            let mut failed = 0usize;

            while let Some(result) = result_rx.recv().await {
                match result {
                    VariantResult::Success(output) => {
                        for task in output.files {
                            if upload_tx.send(task).await.is_err() {
                                warn!("upload channel closed early");
                                break;
                            }
                        }
                        match db.upsert_variant(&ctx, &output.record).await {
                            Ok(_) => succeeded += 1,
                            Err(e) => {
                                error!(
                                    variant = output.name,
                                    "failed to save variant metadata: {e}"
                                );
                                failed += 1;
                            }
                        }
                    }
                    VariantResult::Failure { name, error } => {
                        error!(variant = name, "variant processing failed: {error}");
                        failed += 1;
                    }
                }
            }

            (succeeded, failed)
        })
    };

    // Fan out one worker per descriptor, optionally throttled.
    let transcode_slots = Arc::new(Semaphore::new(config.max_parallel_transcodes));
    let mut variant_handles = Vec::with_capacity(VARIANTS.len());
    for variant in VARIANTS {
        let tx = result_tx.clone();
        let media = Arc::clone(&deps.media);
        let ctx = ctx.clone();
        let slots = Arc::clone(&transcode_slots);
        let work_path = work_dir.path().to_path_buf();
        let source = source_path.clone();
        let bucket = event.bucket.clone();
        let prefix = results_prefix.clone();
        let video_id = event.video_id;
        let thumbnail_at = config.thumbnail_at_secs;

        variant_handles.push(tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            let job = VariantJob {
                work_dir: &work_path,
                source: &source,
                bucket: &bucket,
                results_prefix: &prefix,
                video_id,
                thumbnail_at_secs: thumbnail_at,
            };
            let result = process_variant(&ctx, media.as_ref(), &job, variant).await;
            let _ = tx.send(result).await;
        }));
    }
    drop(result_tx);

    // Join order: variants, router, upload pool.
    for handle in variant_handles {
        let _ = handle.await;
    }
    let (succeeded, failed) = router.await.unwrap_or((0, VARIANTS.len()));
    for handle in upload_handles {
        let _ = handle.await;
    }

    let status = if succeeded > 0 {
        VideoStatus::Processed
    } else {
        VideoStatus::Failed
    };
    if let Err(e) = deps.db.update_status(ctx, event.video_id, status).await {
        warn!(video_id = %event.video_id, "failed to update final status: {e}");
    }

    // Best-effort removal; the scope guard already guarantees cleanup on
    // the early-return paths above.
    if let Err(e) = work_dir.close() {
        warn!("failed to clean up working directory: {e}");
    }

    info!(
        video_id = %event.video_id,
        succeeded,
        failed,
        "video processing completed"
    );

    Ok(JobOutcome { succeeded, failed })
}

fn source_extension(key: &str) -> String {
    Path::new(key)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use chrono::Utc;
    use vod_db::{DbError, DbResult};
    use vod_models::{
        NewOriginalVideo, OriginalVideo, ProcessedVariant, VariantUpsert,
    };
    use vod_storage::{StorageError, StorageResult};

    use crate::variant::tests::FakeTransformer;

    /// In-memory object store: downloads produce a fixed payload,
    /// uploads are recorded.
    #[derive(Default)]
    struct FakeStore {
        missing_source: bool,
        uploads: StdMutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ObjectStore for FakeStore {
        async fn download(
            &self,
            _ctx: &RequestContext,
            _bucket: &str,
            key: &str,
            path: &Path,
        ) -> StorageResult<()> {
            if self.missing_source {
                return Err(StorageError::not_found(key));
            }
            tokio::fs::write(path, b"source").await?;
            Ok(())
        }

        async fn upload(
            &self,
            _ctx: &RequestContext,
            _bucket: &str,
            key: &str,
            path: &Path,
            _content_type: &str,
        ) -> StorageResult<()> {
            // The local file must still exist when the pool gets to it.
            assert!(path.exists(), "upload source missing: {}", path.display());
            self.uploads.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn ensure_bucket(&self, _ctx: &RequestContext, _name: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn presign_get(
            &self,
            _ctx: &RequestContext,
            _bucket: &str,
            _key: &str,
            _expires_in: Duration,
        ) -> StorageResult<String> {
            Ok("http://presigned".to_string())
        }

        async fn stat(
            &self,
            _ctx: &RequestContext,
            _bucket: &str,
            _key: &str,
        ) -> StorageResult<bool> {
            Ok(true)
        }

        async fn delete(&self, _ctx: &RequestContext, _bucket: &str, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    /// In-memory metadata store keyed by (video, variant).
    #[derive(Default)]
    struct FakeDb {
        variants: StdMutex<HashMap<(Uuid, String), VariantUpsert>>,
        statuses: StdMutex<Vec<VideoStatus>>,
    }

    fn variant_row(upsert: &VariantUpsert) -> ProcessedVariant {
        ProcessedVariant {
            id: Uuid::new_v4(),
            video_id: upsert.video_id,
            variant_name: upsert.variant_name.clone(),
            bucket: upsert.bucket.clone(),
            key: upsert.key.clone(),
            content_type: upsert.content_type.clone(),
            hls_playlist_key: upsert.hls_playlist_key.clone(),
            thumbnail_key: upsert.thumbnail_key.clone(),
            width: upsert.width,
            height: upsert.height,
            bitrate_kbps: upsert.bitrate_kbps,
            created_at: Utc::now(),
        }
    }

    #[async_trait::async_trait]
    impl MetadataStore for FakeDb {
        async fn create_video(
            &self,
            _ctx: &RequestContext,
            _video: &NewOriginalVideo,
        ) -> DbResult<OriginalVideo> {
            unimplemented!("not used by the consumer")
        }

        async fn get_video(&self, _ctx: &RequestContext, id: Uuid) -> DbResult<OriginalVideo> {
            Err(DbError::not_found(format!("video {id}")))
        }

        async fn list_videos(
            &self,
            _ctx: &RequestContext,
            _user_id: Uuid,
        ) -> DbResult<Vec<OriginalVideo>> {
            Ok(vec![])
        }

        async fn update_video(
            &self,
            _ctx: &RequestContext,
            id: Uuid,
            _title: &str,
            _description: &str,
        ) -> DbResult<OriginalVideo> {
            Err(DbError::not_found(format!("video {id}")))
        }

        async fn delete_video(&self, _ctx: &RequestContext, _id: Uuid) -> DbResult<()> {
            Ok(())
        }

        async fn update_status(
            &self,
            _ctx: &RequestContext,
            _id: Uuid,
            status: VideoStatus,
        ) -> DbResult<()> {
            self.statuses.lock().unwrap().push(status);
            Ok(())
        }

        async fn update_source_info(
            &self,
            _ctx: &RequestContext,
            _id: Uuid,
            _duration: i32,
            _width: i32,
            _height: i32,
        ) -> DbResult<()> {
            Ok(())
        }

        async fn upsert_variant(
            &self,
            _ctx: &RequestContext,
            variant: &VariantUpsert,
        ) -> DbResult<ProcessedVariant> {
            self.variants
                .lock()
                .unwrap()
                .insert((variant.video_id, variant.variant_name.clone()), variant.clone());
            Ok(variant_row(variant))
        }

        async fn list_variants(
            &self,
            _ctx: &RequestContext,
            _video_id: Uuid,
        ) -> DbResult<Vec<ProcessedVariant>> {
            Ok(vec![])
        }
    }

    fn deps(
        store: Arc<FakeStore>,
        db: Arc<FakeDb>,
        media: Arc<FakeTransformer>,
    ) -> JobDeps {
        JobDeps {
            storage: store,
            db,
            media,
        }
    }

    fn test_config(work_dir: &Path) -> WorkerConfig {
        WorkerConfig {
            work_dir: work_dir.to_string_lossy().into_owned(),
            ..WorkerConfig::default()
        }
    }

    #[tokio::test]
    async fn happy_path_produces_all_variants() {
        let base = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::default());
        let db = Arc::new(FakeDb::default());
        let media = Arc::new(FakeTransformer::default());
        let deps = deps(store.clone(), db.clone(), media.clone());
        let config = test_config(base.path());
        let video_id = Uuid::new_v4();
        let event = JobEvent::new("user-bucket", "sample.mp4", video_id);

        let outcome = process_job(&deps, &config, &RequestContext::new(), &event)
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome { succeeded: 6, failed: 0 });

        // One row per descriptor, all for this video.
        let variants = db.variants.lock().unwrap();
        assert_eq!(variants.len(), 6);
        for descriptor in VARIANTS {
            assert!(variants.contains_key(&(video_id, descriptor.name.to_string())));
        }

        // 6 mp4 + 6 m3u8 + 12 ts + 6 jpg uploads
        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.iter().filter(|k| k.ends_with(".mp4")).count(), 6);
        assert_eq!(uploads.iter().filter(|k| k.ends_with(".m3u8")).count(), 6);
        assert_eq!(uploads.iter().filter(|k| k.ends_with(".ts")).count(), 12);
        assert_eq!(uploads.iter().filter(|k| k.ends_with(".jpg")).count(), 6);

        // queued→processing happened, then processed.
        let statuses = db.statuses.lock().unwrap();
        assert_eq!(
            *statuses,
            vec![VideoStatus::Processing, VideoStatus::Processed]
        );
    }

    #[tokio::test]
    async fn variant_failure_is_isolated() {
        let base = tempfile::tempdir().unwrap();
        let db = Arc::new(FakeDb::default());
        let media = Arc::new(FakeTransformer {
            fail_transcode_for: Some("144p"),
            ..FakeTransformer::default()
        });
        let deps = deps(Arc::new(FakeStore::default()), db.clone(), media);
        let config = test_config(base.path());
        let video_id = Uuid::new_v4();
        let event = JobEvent::new("user-bucket", "sample.mp4", video_id);

        let outcome = process_job(&deps, &config, &RequestContext::new(), &event)
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome { succeeded: 5, failed: 1 });

        let variants = db.variants.lock().unwrap();
        assert!(!variants.contains_key(&(video_id, "144p".to_string())));
        assert_eq!(variants.len(), 5);

        // Partial success still counts as processed.
        assert_eq!(
            db.statuses.lock().unwrap().last(),
            Some(&VideoStatus::Processed)
        );
    }

    #[tokio::test]
    async fn missing_source_is_fatal() {
        let base = tempfile::tempdir().unwrap();
        let deps = deps(
            Arc::new(FakeStore {
                missing_source: true,
                ..FakeStore::default()
            }),
            Arc::new(FakeDb::default()),
            Arc::new(FakeTransformer::default()),
        );
        let config = test_config(base.path());
        let event = JobEvent::new("user-bucket", "missing.mp4", Uuid::new_v4());

        let err = process_job(&deps, &config, &RequestContext::new(), &event)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorkerError::Storage(StorageError::NotFound(_))
        ));

        // Fatal exit still leaves no working directory behind.
        let leftovers: Vec<_> = std::fs::read_dir(base.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn working_directory_is_removed_after_success() {
        let base = tempfile::tempdir().unwrap();
        let deps = deps(
            Arc::new(FakeStore::default()),
            Arc::new(FakeDb::default()),
            Arc::new(FakeTransformer::default()),
        );
        let config = test_config(base.path());
        let event = JobEvent::new("user-bucket", "sample.mp4", Uuid::new_v4());

        process_job(&deps, &config, &RequestContext::new(), &event)
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(base.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn source_extension_is_preserved() {
        assert_eq!(source_extension("movie.mp4"), ".mp4");
        assert_eq!(source_extension("clip.webm"), ".webm");
        assert_eq!(source_extension("noext"), "");
    }
}
