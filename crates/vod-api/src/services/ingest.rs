//! Ingest producer: stage uploads, record originals, publish job events.

use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::info;
use uuid::Uuid;

use vod_broker::Broker;
use vod_db::MetadataStore;
use vod_models::{JobEvent, NewOriginalVideo, OriginalVideo, RequestContext};
use vod_storage::ObjectStore;

use crate::error::{ApiError, ApiResult};

/// One file staged to local disk by the upload handler.
///
/// The temp file keeps the staged bytes alive for the duration of the
/// request and is removed on drop.
pub struct StagedUpload {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub file: NamedTempFile,
}

/// A validated-or-not upload request.
pub struct UploadRequest {
    pub title: String,
    pub description: String,
    pub files: Vec<StagedUpload>,
}

impl UploadRequest {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("description is required".to_string());
        }
        if self.files.is_empty() {
            return Err("at least one video file is required".to_string());
        }
        Ok(())
    }
}

/// The ingest producer.
///
/// For each file: ensure the per-user bucket, stream the staged file into
/// it, record the original-video row, publish the processing event. A
/// failure aborts the request; earlier files stay put (at-least-once).
#[derive(Clone)]
pub struct IngestService {
    storage: Arc<dyn ObjectStore>,
    db: Arc<dyn MetadataStore>,
    broker: Arc<dyn Broker>,
}

impl IngestService {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        db: Arc<dyn MetadataStore>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            storage,
            db,
            broker,
        }
    }

    pub async fn upload(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        request: UploadRequest,
    ) -> ApiResult<Vec<OriginalVideo>> {
        if let Err(reason) = request.validate() {
            return Err(ApiError::invalid_input(
                reason,
                format!("user_id: {user_id}"),
            ));
        }

        let bucket = user_id.to_string();
        let mut created = Vec::with_capacity(request.files.len());

        for staged in &request.files {
            let params = format!("user_id: {user_id}, filename: {}", staged.filename);

            self.storage
                .ensure_bucket(ctx, &bucket)
                .await
                .map_err(|e| {
                    ApiError::internal(format!("failed to ensure user bucket: {e}"), params.clone())
                })?;

            self.storage
                .upload(
                    ctx,
                    &bucket,
                    &staged.filename,
                    staged.file.path(),
                    &staged.content_type,
                )
                .await
                .map_err(|e| {
                    ApiError::internal(
                        format!("failed to upload file to storage: {e}"),
                        params.clone(),
                    )
                })?;

            let video = self
                .db
                .create_video(
                    ctx,
                    &NewOriginalVideo {
                        user_id,
                        title: request.title.clone(),
                        description: request.description.clone(),
                        filename: staged.filename.clone(),
                        bucket: bucket.clone(),
                        key: staged.filename.clone(),
                        file_size_bytes: staged.size_bytes,
                        content_type: staged.content_type.clone(),
                    },
                )
                .await
                .map_err(|e| {
                    ApiError::internal(
                        format!("failed to save video metadata: {e}"),
                        params.clone(),
                    )
                })?;

            let event = JobEvent::new(bucket.clone(), staged.filename.clone(), video.id);
            self.broker
                .publish(ctx, &event.to_fields())
                .await
                .map_err(|e| {
                    ApiError::internal(
                        format!("failed to publish processing event: {e}"),
                        params.clone(),
                    )
                })?;

            info!(video_id = %video.id, filename = %staged.filename, "ingested video");
            created.push(video);
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(name: &str) -> StagedUpload {
        StagedUpload {
            filename: name.to_string(),
            content_type: "video/mp4".to_string(),
            size_bytes: 4,
            file: NamedTempFile::new().unwrap(),
        }
    }

    #[test]
    fn empty_title_fails_validation() {
        let request = UploadRequest {
            title: " ".to_string(),
            description: "d".to_string(),
            files: vec![staged("a.mp4")],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn missing_files_fail_validation() {
        let request = UploadRequest {
            title: "t".to_string(),
            description: "d".to_string(),
            files: vec![],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn complete_request_passes_validation() {
        let request = UploadRequest {
            title: "t".to_string(),
            description: "d".to_string(),
            files: vec![staged("a.mp4")],
        };
        assert!(request.validate().is_ok());
    }
}
