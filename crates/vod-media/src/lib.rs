//! External transcoder invocation layer.
//!
//! Wraps ffmpeg/ffprobe subprocesses behind the [`MediaTransformer`]
//! capability trait: scaled container transcode, segmented VOD playlist
//! generation, single-frame thumbnail extraction and source probing.
//! Every invocation is cancellation-aware and captures bounded
//! diagnostics for failures.

pub mod command;
pub mod error;
pub mod hls;
pub mod probe;
pub mod thumbnail;
pub mod transcode;

use std::path::Path;

use vod_models::{RequestContext, VariantDescriptor};

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use error::{MediaError, MediaResult};
pub use hls::PLAYLIST_NAME;
pub use probe::SourceInfo;

/// Capability set the pipeline needs from the media transformer.
#[async_trait::async_trait]
pub trait MediaTransformer: Send + Sync {
    /// Produce `output` by scaling and re-encoding `input` per the
    /// variant descriptor.
    async fn transcode_container(
        &self,
        ctx: &RequestContext,
        input: &Path,
        output: &Path,
        variant: &VariantDescriptor,
    ) -> MediaResult<()>;

    /// Produce `out_dir/index.m3u8` plus media segments from an mp4.
    async fn generate_hls(
        &self,
        ctx: &RequestContext,
        mp4: &Path,
        out_dir: &Path,
    ) -> MediaResult<()>;

    /// Write exactly one JPEG frame taken `at_second` into the video.
    async fn extract_thumbnail(
        &self,
        ctx: &RequestContext,
        mp4: &Path,
        out_jpg: &Path,
        at_second: u32,
    ) -> MediaResult<()>;

    /// Probe duration and dimensions of a source file.
    async fn probe(&self, ctx: &RequestContext, path: &Path) -> MediaResult<SourceInfo>;
}

/// The ffmpeg-backed transformer.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTransformer;

impl FfmpegTransformer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl MediaTransformer for FfmpegTransformer {
    async fn transcode_container(
        &self,
        ctx: &RequestContext,
        input: &Path,
        output: &Path,
        variant: &VariantDescriptor,
    ) -> MediaResult<()> {
        transcode::transcode_container(ctx, input, output, variant).await
    }

    async fn generate_hls(
        &self,
        ctx: &RequestContext,
        mp4: &Path,
        out_dir: &Path,
    ) -> MediaResult<()> {
        hls::generate_hls(ctx, mp4, out_dir).await
    }

    async fn extract_thumbnail(
        &self,
        ctx: &RequestContext,
        mp4: &Path,
        out_jpg: &Path,
        at_second: u32,
    ) -> MediaResult<()> {
        thumbnail::extract_thumbnail(ctx, mp4, out_jpg, at_second).await
    }

    async fn probe(&self, ctx: &RequestContext, path: &Path) -> MediaResult<SourceInfo> {
        probe::probe(ctx, path).await
    }
}
