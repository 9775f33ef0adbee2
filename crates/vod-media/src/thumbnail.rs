//! Representative thumbnail extraction.

use std::path::Path;

use vod_models::RequestContext;

use crate::command::{run_ffmpeg, FfmpegCommand};
use crate::error::MediaResult;

/// JPEG quality scale; numerically lower is higher quality.
const JPEG_QUALITY: u8 = 2;

/// Extract a single JPEG frame at `at_second` into the video.
///
/// The seek is an output option (after `-i`), trading speed for
/// frame-accurate positioning.
pub async fn extract_thumbnail(
    ctx: &RequestContext,
    mp4: impl AsRef<Path>,
    out_jpg: impl AsRef<Path>,
    at_second: u32,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(mp4.as_ref(), out_jpg.as_ref())
        .output_arg("-ss")
        .output_arg(seek_timestamp(at_second))
        .single_frame()
        .quality(JPEG_QUALITY);

    run_ffmpeg(ctx, &cmd).await
}

fn seek_timestamp(at_second: u32) -> String {
    format!("00:00:{:02}", at_second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_timestamp_is_zero_padded() {
        assert_eq!(seek_timestamp(5), "00:00:05");
        assert_eq!(seek_timestamp(30), "00:00:30");
    }

    #[test]
    fn thumbnail_argv_matches_the_contract() {
        let cmd = FfmpegCommand::new("v.mp4", "v-thumb.jpg")
            .output_arg("-ss")
            .output_arg(seek_timestamp(5))
            .single_frame()
            .quality(JPEG_QUALITY);

        assert_eq!(
            cmd.build_args(),
            vec![
                "-y", "-nostdin", "-i", "v.mp4", "-ss", "00:00:05", "-vframes", "1", "-q:v",
                "2", "v-thumb.jpg",
            ]
        );
    }
}
