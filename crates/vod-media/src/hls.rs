//! HLS playlist and segment generation.

use std::path::Path;

use vod_models::RequestContext;

use crate::command::{run_ffmpeg, FfmpegCommand};
use crate::error::MediaResult;

/// Segment length in seconds.
const SEGMENT_SECONDS: u32 = 6;

/// Playlist filename within the output directory.
pub const PLAYLIST_NAME: &str = "index.m3u8";

/// Generate a finalized VOD playlist plus `segment_%03d.ts` media segments
/// from an mp4, re-encoding to H.264 + AAC with `yuv420p` pixel format.
pub async fn generate_hls(
    ctx: &RequestContext,
    mp4: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> MediaResult<()> {
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir).await?;

    let playlist = out_dir.join(PLAYLIST_NAME);
    let segment_pattern = out_dir.join("segment_%03d.ts");

    let cmd = FfmpegCommand::new(mp4.as_ref(), &playlist)
        .video_codec("libx264")
        .audio_codec("aac")
        .video_filter("format=yuv420p")
        .output_args(["-hls_time", &SEGMENT_SECONDS.to_string()])
        .output_args(["-hls_playlist_type", "vod"])
        .output_args([
            "-hls_segment_filename",
            &segment_pattern.to_string_lossy(),
        ]);

    run_ffmpeg(ctx, &cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hls_argv_matches_the_contract() {
        let cmd = FfmpegCommand::new("v.mp4", "out/index.m3u8")
            .video_codec("libx264")
            .audio_codec("aac")
            .video_filter("format=yuv420p")
            .output_args(["-hls_time", "6"])
            .output_args(["-hls_playlist_type", "vod"])
            .output_args(["-hls_segment_filename", "out/segment_%03d.ts"]);

        assert_eq!(
            cmd.build_args(),
            vec![
                "-y", "-nostdin", "-i", "v.mp4", "-c:v", "libx264", "-c:a", "aac", "-vf",
                "format=yuv420p", "-hls_time", "6", "-hls_playlist_type", "vod",
                "-hls_segment_filename", "out/segment_%03d.ts", "out/index.m3u8",
            ]
        );
    }
}
