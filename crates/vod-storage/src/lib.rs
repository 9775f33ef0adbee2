//! Object store adapter for an S3-compatible backend (MinIO in
//! deployment, any S3 endpoint in principle).
//!
//! Everything goes through the [`ObjectStore`] capability trait so the
//! producer and consumer depend on the operations, not the SDK.

pub mod client;
pub mod error;

use std::path::Path;
use std::time::Duration;

use vod_models::RequestContext;

pub use client::{S3Store, StorageConfig};
pub use error::{StorageError, StorageResult};

/// Capability set the pipeline needs from an object store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream a remote object to a local path without buffering the whole
    /// body in memory.
    async fn download(
        &self,
        ctx: &RequestContext,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> StorageResult<()>;

    /// Stream a local file to a remote key. Last write wins.
    async fn upload(
        &self,
        ctx: &RequestContext,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Existence check followed by create-if-missing; losing a creation
    /// race is success.
    async fn ensure_bucket(&self, ctx: &RequestContext, name: &str) -> StorageResult<()>;

    /// Time-limited GET URL; does not touch the object.
    async fn presign_get(
        &self,
        ctx: &RequestContext,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Whether the key currently resolves to an object.
    async fn stat(&self, ctx: &RequestContext, bucket: &str, key: &str) -> StorageResult<bool>;

    async fn delete(&self, ctx: &RequestContext, bucket: &str, key: &str) -> StorageResult<()>;
}
