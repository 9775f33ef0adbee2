//! Video API handlers.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use vod_models::{OriginalVideo, ProcessedVariant, RequestContext};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult, Envelope};
use crate::services::{StagedUpload, UploadRequest};
use crate::state::AppState;

fn request_ctx(state: &AppState, user: &AuthUser) -> RequestContext {
    RequestContext::for_user(user.0).with_deadline(state.config.request_timeout)
}

/// `POST /api/videos`: multipart upload of one or more source videos.
pub async fn upload_videos(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<Envelope<Vec<OriginalVideo>>>> {
    let ctx = request_ctx(&state, &user);
    let request = stage_request(multipart).await?;
    let created = state.ingest.upload(&ctx, user.0, request).await?;
    Ok(Json(Envelope::success(created)))
}

/// Pull the multipart body apart, spooling each file part to disk.
async fn stage_request(mut multipart: Multipart) -> ApiResult<UploadRequest> {
    let mut title = String::new();
    let mut description = String::new();
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        ApiError::invalid_input(format!("malformed multipart body: {e}"), String::new())
    })? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "title" => {
                title = field.text().await.map_err(|e| {
                    ApiError::invalid_input(format!("unreadable title field: {e}"), String::new())
                })?;
            }
            "description" => {
                description = field.text().await.map_err(|e| {
                    ApiError::invalid_input(
                        format!("unreadable description field: {e}"),
                        String::new(),
                    )
                })?;
            }
            "videos" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        ApiError::invalid_input("file part without a filename", String::new())
                    })?;
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let staged = NamedTempFile::new().map_err(|e| {
                    ApiError::internal(format!("failed to stage upload: {e}"), String::new())
                })?;
                let mut out = tokio::fs::File::create(staged.path()).await.map_err(|e| {
                    ApiError::internal(format!("failed to stage upload: {e}"), String::new())
                })?;

                let mut size_bytes: i64 = 0;
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    ApiError::invalid_input(
                        format!("truncated file part: {e}"),
                        format!("filename: {filename}"),
                    )
                })? {
                    size_bytes += chunk.len() as i64;
                    out.write_all(&chunk).await.map_err(|e| {
                        ApiError::internal(
                            format!("failed to stage upload: {e}"),
                            format!("filename: {filename}"),
                        )
                    })?;
                }
                out.flush().await.map_err(|e| {
                    ApiError::internal(
                        format!("failed to stage upload: {e}"),
                        format!("filename: {filename}"),
                    )
                })?;

                files.push(StagedUpload {
                    filename,
                    content_type,
                    size_bytes,
                    file: staged,
                });
            }
            other => {
                warn!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    Ok(UploadRequest {
        title,
        description,
        files,
    })
}

/// `GET /api/videos`: list the caller's library.
pub async fn list_videos(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Envelope<Vec<OriginalVideo>>>> {
    let ctx = request_ctx(&state, &user);
    let videos = state.db.list_videos(&ctx, user.0).await?;
    Ok(Json(Envelope::success(videos)))
}

/// Fetch a video and hide other users' records.
async fn owned_video(
    state: &AppState,
    ctx: &RequestContext,
    user: &AuthUser,
    id: Uuid,
) -> ApiResult<OriginalVideo> {
    let video = state.db.get_video(ctx, id).await?;
    if video.user_id != user.0 {
        return Err(ApiError::not_found(format!("video {id}")));
    }
    Ok(video)
}

/// `GET /api/videos/:id`
pub async fn get_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<OriginalVideo>>> {
    let ctx = request_ctx(&state, &user);
    let video = owned_video(&state, &ctx, &user, id).await?;
    Ok(Json(Envelope::success(video)))
}

/// `GET /api/videos/:id/variants`
pub async fn list_variants(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<Vec<ProcessedVariant>>>> {
    let ctx = request_ctx(&state, &user);
    owned_video(&state, &ctx, &user, id).await?;
    let variants = state.db.list_variants(&ctx, id).await?;
    Ok(Json(Envelope::success(variants)))
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub url: String,
    pub expires_in_secs: u64,
}

/// `GET /api/videos/:id/download`: presigned GET URL for the source.
pub async fn download_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<DownloadResponse>>> {
    let ctx = request_ctx(&state, &user);
    let video = owned_video(&state, &ctx, &user, id).await?;

    let url = state
        .storage
        .presign_get(&ctx, &video.bucket, &video.key, state.config.presign_expiry)
        .await?;

    Ok(Json(Envelope::success(DownloadResponse {
        url,
        expires_in_secs: state.config.presign_expiry.as_secs(),
    })))
}

/// `DELETE /api/videos/:id`: drop the record (variants cascade) and
/// best-effort remove the source object.
pub async fn delete_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    let ctx = request_ctx(&state, &user);
    let video = owned_video(&state, &ctx, &user, id).await?;

    state.db.delete_video(&ctx, id).await?;

    if let Err(e) = state.storage.delete(&ctx, &video.bucket, &video.key).await {
        warn!(video_id = %id, "failed to delete source object: {e}");
    }

    Ok(Json(Envelope::success(())))
}
