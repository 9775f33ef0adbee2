//! Per-variant pipeline: transcode, segment, thumbnail, enumerate.

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use vod_media::{MediaError, MediaTransformer, PLAYLIST_NAME};
use vod_models::{RequestContext, VariantDescriptor, VariantUpsert};

use crate::error::{WorkerError, WorkerResult};

/// One file to be pushed through the upload pool.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub bucket: String,
    pub object_key: String,
    pub local_path: PathBuf,
    pub content_type: String,
}

/// Everything a successful variant hands to the result router.
#[derive(Debug)]
pub struct VariantOutput {
    pub name: &'static str,
    pub files: Vec<UploadTask>,
    pub record: VariantUpsert,
}

/// Outcome of one variant worker.
#[derive(Debug)]
pub enum VariantResult {
    Success(Box<VariantOutput>),
    Failure {
        name: &'static str,
        error: WorkerError,
    },
}

/// Job-scoped inputs shared by every variant worker of one job.
#[derive(Debug, Clone)]
pub struct VariantJob<'a> {
    pub work_dir: &'a Path,
    pub source: &'a Path,
    pub bucket: &'a str,
    /// `processed/<job-uuid>` prefix of this attempt
    pub results_prefix: &'a str,
    pub video_id: Uuid,
    pub thumbnail_at_secs: u32,
}

/// Run the full pipeline for one variant.
///
/// Failures are contained here so one bad rendition never takes down its
/// siblings; only the result value carries the error out.
pub async fn process_variant(
    ctx: &RequestContext,
    media: &dyn MediaTransformer,
    job: &VariantJob<'_>,
    variant: &'static VariantDescriptor,
) -> VariantResult {
    match run_variant(ctx, media, job, variant).await {
        Ok(output) => VariantResult::Success(Box::new(output)),
        Err(error) => VariantResult::Failure {
            name: variant.name,
            error,
        },
    }
}

async fn run_variant(
    ctx: &RequestContext,
    media: &dyn MediaTransformer,
    job: &VariantJob<'_>,
    variant: &'static VariantDescriptor,
) -> WorkerResult<VariantOutput> {
    let var_dir = job.work_dir.join(variant.name);
    tokio::fs::create_dir_all(&var_dir).await?;

    let mp4 = var_dir.join(format!("{}.mp4", variant.name));
    media
        .transcode_container(ctx, job.source, &mp4, variant)
        .await?;

    // Playlist and segments land next to the container file.
    media.generate_hls(ctx, &mp4, &var_dir).await?;

    let thumb = var_dir.join(format!("{}-thumb.jpg", variant.name));
    let mut has_thumbnail = true;
    if let Err(e) = media
        .extract_thumbnail(ctx, &mp4, &thumb, job.thumbnail_at_secs)
        .await
    {
        if matches!(e, MediaError::Cancelled) {
            return Err(e.into());
        }
        warn!(variant = variant.name, "thumbnail generation failed: {e}");
        has_thumbnail = false;
    }

    let dest_prefix = format!("{}/{}", job.results_prefix, variant.name);
    let files = collect_upload_tasks(&var_dir, job.bucket, &dest_prefix).await?;

    let record = VariantUpsert {
        video_id: job.video_id,
        variant_name: variant.name.to_string(),
        bucket: job.bucket.to_string(),
        key: format!("{dest_prefix}/{}.mp4", variant.name),
        content_type: "video/mp4".to_string(),
        hls_playlist_key: Some(format!("{dest_prefix}/{PLAYLIST_NAME}")),
        thumbnail_key: has_thumbnail
            .then(|| format!("{dest_prefix}/{}-thumb.jpg", variant.name)),
        width: Some(variant.width as i32),
        height: Some(variant.height as i32),
        bitrate_kbps: Some(variant.bitrate_kbps as i32),
    };

    Ok(VariantOutput {
        name: variant.name,
        files,
        record,
    })
}

/// Enumerate the variant directory into upload tasks, one per file, keyed
/// under `dest_prefix/<basename>`.
pub async fn collect_upload_tasks(
    dir: &Path,
    bucket: &str,
    dest_prefix: &str,
) -> WorkerResult<Vec<UploadTask>> {
    let mut tasks = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        tasks.push(UploadTask {
            bucket: bucket.to_string(),
            object_key: format!("{dest_prefix}/{name}"),
            local_path: entry.path(),
            content_type: content_type_for(&name),
        });
    }

    tasks.sort_by(|a, b| a.object_key.cmp(&b.object_key));
    Ok(tasks)
}

/// Content type by file extension.
pub fn content_type_for(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/mp2t",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use vod_media::{MediaResult, SourceInfo};
    use vod_models::variant::variant_by_name;

    /// Transformer that fabricates plausible output files on disk.
    #[derive(Default)]
    pub(crate) struct FakeTransformer {
        pub fail_transcode_for: Option<&'static str>,
        pub fail_thumbnail: bool,
        pub transcoded: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MediaTransformer for FakeTransformer {
        async fn transcode_container(
            &self,
            _ctx: &RequestContext,
            _input: &Path,
            output: &Path,
            variant: &VariantDescriptor,
        ) -> MediaResult<()> {
            if self.fail_transcode_for == Some(variant.name) {
                return Err(MediaError::command_failed("ffmpeg", Some(1), "boom"));
            }
            self.transcoded.lock().unwrap().push(variant.name.to_string());
            tokio::fs::write(output, b"mp4").await?;
            Ok(())
        }

        async fn generate_hls(
            &self,
            _ctx: &RequestContext,
            _mp4: &Path,
            out_dir: &Path,
        ) -> MediaResult<()> {
            tokio::fs::write(out_dir.join("index.m3u8"), b"#EXTM3U").await?;
            tokio::fs::write(out_dir.join("segment_000.ts"), b"ts").await?;
            tokio::fs::write(out_dir.join("segment_001.ts"), b"ts").await?;
            Ok(())
        }

        async fn extract_thumbnail(
            &self,
            _ctx: &RequestContext,
            _mp4: &Path,
            out_jpg: &Path,
            _at_second: u32,
        ) -> MediaResult<()> {
            if self.fail_thumbnail {
                return Err(MediaError::command_failed("ffmpeg", Some(1), "no frame"));
            }
            tokio::fs::write(out_jpg, b"jpg").await?;
            Ok(())
        }

        async fn probe(&self, _ctx: &RequestContext, _path: &Path) -> MediaResult<SourceInfo> {
            Ok(SourceInfo {
                duration: 10.0,
                width: 1920,
                height: 1080,
            })
        }
    }

    #[test]
    fn content_type_classification() {
        assert_eq!(content_type_for("720p.mp4"), "video/mp4");
        assert_eq!(content_type_for("index.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("segment_003.ts"), "video/mp2t");
        assert_eq!(content_type_for("720p-thumb.jpg"), "image/jpeg");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
    }

    #[tokio::test]
    async fn variant_pipeline_produces_files_and_record() {
        let work = tempfile::tempdir().unwrap();
        let source = work.path().join("source.mp4");
        tokio::fs::write(&source, b"src").await.unwrap();

        let media = FakeTransformer::default();
        let video_id = Uuid::new_v4();
        let variant = variant_by_name("720p").unwrap();

        let job = VariantJob {
            work_dir: work.path(),
            source: &source,
            bucket: "user-bucket",
            results_prefix: "processed/job-1",
            video_id,
            thumbnail_at_secs: 5,
        };
        let result = process_variant(&RequestContext::new(), &media, &job, variant).await;

        let output = match result {
            VariantResult::Success(output) => output,
            VariantResult::Failure { error, .. } => panic!("unexpected failure: {error}"),
        };

        let keys: Vec<_> = output.files.iter().map(|t| t.object_key.as_str()).collect();
        assert_eq!(
            keys,
            [
                "processed/job-1/720p/720p-thumb.jpg",
                "processed/job-1/720p/720p.mp4",
                "processed/job-1/720p/index.m3u8",
                "processed/job-1/720p/segment_000.ts",
                "processed/job-1/720p/segment_001.ts",
            ]
        );

        assert_eq!(output.record.key, "processed/job-1/720p/720p.mp4");
        assert_eq!(
            output.record.hls_playlist_key.as_deref(),
            Some("processed/job-1/720p/index.m3u8")
        );
        assert_eq!(
            output.record.thumbnail_key.as_deref(),
            Some("processed/job-1/720p/720p-thumb.jpg")
        );
        assert_eq!(output.record.width, Some(1280));
        assert_eq!(output.record.bitrate_kbps, Some(2000));
    }

    #[tokio::test]
    async fn thumbnail_failure_is_non_fatal() {
        let work = tempfile::tempdir().unwrap();
        let source = work.path().join("source.mp4");
        tokio::fs::write(&source, b"src").await.unwrap();

        let media = FakeTransformer {
            fail_thumbnail: true,
            ..FakeTransformer::default()
        };

        let job = VariantJob {
            work_dir: work.path(),
            source: &source,
            bucket: "user-bucket",
            results_prefix: "processed/job-2",
            video_id: Uuid::new_v4(),
            thumbnail_at_secs: 5,
        };
        let result = process_variant(
            &RequestContext::new(),
            &media,
            &job,
            variant_by_name("480p").unwrap(),
        )
        .await;

        let output = match result {
            VariantResult::Success(output) => output,
            VariantResult::Failure { error, .. } => panic!("unexpected failure: {error}"),
        };

        assert!(output.record.thumbnail_key.is_none());
        assert!(output
            .files
            .iter()
            .all(|t| !t.object_key.ends_with("-thumb.jpg")));
    }

    #[tokio::test]
    async fn transcode_failure_fails_only_this_variant() {
        let work = tempfile::tempdir().unwrap();
        let source = work.path().join("source.mp4");
        tokio::fs::write(&source, b"src").await.unwrap();

        let media = FakeTransformer {
            fail_transcode_for: Some("144p"),
            ..FakeTransformer::default()
        };

        let job = VariantJob {
            work_dir: work.path(),
            source: &source,
            bucket: "user-bucket",
            results_prefix: "processed/job-3",
            video_id: Uuid::new_v4(),
            thumbnail_at_secs: 5,
        };
        let result = process_variant(
            &RequestContext::new(),
            &media,
            &job,
            variant_by_name("144p").unwrap(),
        )
        .await;

        match result {
            VariantResult::Failure { name, .. } => assert_eq!(name, "144p"),
            VariantResult::Success(_) => panic!("expected failure"),
        }
    }
}
