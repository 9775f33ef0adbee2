//! Scaled container transcode.

use std::path::Path;

use vod_models::{RequestContext, VariantDescriptor};

use crate::command::{run_ffmpeg, FfmpegCommand};
use crate::error::MediaResult;

/// Transcode `input` into an mp4 at the variant's resolution and bitrate.
///
/// H.264 video at the target bitrate (preset `fast`), AAC stereo audio at
/// 44.1 kHz. Overwrites `output` if present.
pub async fn transcode_container(
    ctx: &RequestContext,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    variant: &VariantDescriptor,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .video_filter(format!("scale={}:{}", variant.width, variant.height))
        .video_codec("libx264")
        .video_bitrate(variant.bitrate_arg())
        .preset("fast")
        .audio_codec("aac")
        .audio_channels(2)
        .audio_rate(44100);

    run_ffmpeg(ctx, &cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use vod_models::variant::variant_by_name;

    #[test]
    fn transcode_argv_matches_the_contract() {
        let v = variant_by_name("720p").unwrap();
        let cmd = FfmpegCommand::new("src.mp4", "720p.mp4")
            .video_filter(format!("scale={}:{}", v.width, v.height))
            .video_codec("libx264")
            .video_bitrate(v.bitrate_arg())
            .preset("fast")
            .audio_codec("aac")
            .audio_channels(2)
            .audio_rate(44100);

        assert_eq!(
            cmd.build_args(),
            vec![
                "-y", "-nostdin", "-i", "src.mp4", "-vf", "scale=1280:720", "-c:v", "libx264",
                "-b:v", "2000k", "-preset", "fast", "-c:a", "aac", "-ac", "2", "-ar", "44100",
                "720p.mp4",
            ]
        );
    }
}
