//! S3-compatible client implementation.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use vod_models::RequestContext;

use crate::error::{StorageError, StorageResult};
use crate::ObjectStore;

/// Configuration for the S3-compatible store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Endpoint URL, e.g. `http://localhost:9000`
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Region; MinIO accepts anything, the SDK requires one
    pub region: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("VOD_MINIO_ENDPOINT_URL")
                .map_err(|_| StorageError::config("VOD_MINIO_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("VOD_MINIO_ACCESS_KEY")
                .map_err(|_| StorageError::config("VOD_MINIO_ACCESS_KEY not set"))?,
            secret_access_key: std::env::var("VOD_MINIO_SECRET_KEY")
                .map_err(|_| StorageError::config("VOD_MINIO_SECRET_KEY not set"))?,
            region: std::env::var("VOD_MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Object store client over the S3 API with path-style addressing.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Create a new store from configuration.
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vod",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    /// Run `fut` under the context's cancellation token and deadline.
    async fn guard<T>(
        ctx: &RequestContext,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        if ctx.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        match ctx.remaining() {
            Some(left) => tokio::select! {
                _ = ctx.cancel.cancelled() => Err(StorageError::Cancelled),
                res = tokio::time::timeout(left, fut) => {
                    res.map_err(|_| StorageError::Cancelled)?
                }
            },
            None => tokio::select! {
                _ = ctx.cancel.cancelled() => Err(StorageError::Cancelled),
                res = fut => res,
            },
        }
    }

    async fn download_inner(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stream the body chunk by chunk; the object may be far larger
        // than we want resident in memory.
        let mut file = tokio::fs::File::create(path).await?;
        let mut body = response.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!("downloaded s3://{}/{} to {}", bucket, key, path.display());
        Ok(())
    }

    async fn upload_inner(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        // ByteStream::from_path streams from disk; the SDK switches to
        // multipart for large bodies on its own.
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        debug!("uploaded {} to s3://{}/{}", path.display(), bucket, key);
        Ok(())
    }

    async fn ensure_bucket_inner(&self, name: &str) -> StorageResult<()> {
        match self.client.head_bucket().bucket(name).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if !msg.contains("NotFound") && !msg.contains("404") {
                    return Err(StorageError::BucketFailed(msg));
                }
            }
        }

        match self.client.create_bucket().bucket(name).send().await {
            Ok(_) => {
                info!("created bucket {}", name);
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                // A racing creator is not a failure.
                if msg.contains("BucketAlreadyOwnedByYou") || msg.contains("BucketAlreadyExists") {
                    warn!("bucket {} created concurrently", name);
                    Ok(())
                } else {
                    Err(StorageError::BucketFailed(msg))
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    async fn download(
        &self,
        ctx: &RequestContext,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> StorageResult<()> {
        Self::guard(ctx, self.download_inner(bucket, key, path)).await
    }

    async fn upload(
        &self,
        ctx: &RequestContext,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        Self::guard(ctx, self.upload_inner(bucket, key, path, content_type)).await
    }

    async fn ensure_bucket(&self, ctx: &RequestContext, name: &str) -> StorageResult<()> {
        Self::guard(ctx, self.ensure_bucket_inner(name)).await
    }

    async fn presign_get(
        &self,
        ctx: &RequestContext,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let fut = async {
            let presign_config = PresigningConfig::expires_in(expires_in)
                .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

            let presigned = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .presigned(presign_config)
                .await
                .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

            Ok(presigned.uri().to_string())
        };
        Self::guard(ctx, fut).await
    }

    async fn stat(&self, ctx: &RequestContext, bucket: &str, key: &str) -> StorageResult<bool> {
        let fut = async {
            match self
                .client
                .head_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e) => {
                    let msg = e.to_string();
                    if msg.contains("NotFound") || msg.contains("NoSuchKey") {
                        Ok(false)
                    } else {
                        Err(StorageError::Sdk(msg))
                    }
                }
            }
        };
        Self::guard(ctx, fut).await
    }

    async fn delete(&self, ctx: &RequestContext, bucket: &str, key: &str) -> StorageResult<()> {
        let fut = async {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
            Ok(())
        };
        Self::guard(ctx, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vod_models::RequestContext;

    fn store() -> S3Store {
        S3Store::new(StorageConfig {
            endpoint_url: "http://127.0.0.1:1".to_string(),
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            region: "us-east-1".to_string(),
        })
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = RequestContext::new();
        ctx.cancel.cancel();
        let err = store()
            .stat(&ctx, "bucket", "key")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Cancelled));
    }

    #[tokio::test]
    async fn elapsed_deadline_short_circuits() {
        let ctx = RequestContext::new().with_deadline(Duration::ZERO);
        let err = store()
            .download(&ctx, "bucket", "key", Path::new("/tmp/out"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Cancelled));
    }
}
