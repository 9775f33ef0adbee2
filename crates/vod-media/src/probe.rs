//! FFprobe source inspection.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use vod_models::RequestContext;

use crate::error::{MediaError, MediaResult};

/// Technical attributes of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a video file for duration and dimensions.
pub async fn probe(ctx: &RequestContext, path: impl AsRef<Path>) -> MediaResult<SourceInfo> {
    let path = path.as_ref();
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let child = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // kill_on_drop reaps the child if cancellation wins the race
    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = ctx.cancel.cancelled() => return Err(MediaError::Cancelled),
    };

    if !output.status.success() {
        return Err(MediaError::command_failed(
            "ffprobe",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<SourceInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("no video stream found".to_string()))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(SourceInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_json() {
        let json = br#"{
            "format": {"duration": "10.5"},
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1920, "height": 1080}
            ]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(
            info,
            SourceInfo {
                duration: 10.5,
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn audio_only_files_are_rejected() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
