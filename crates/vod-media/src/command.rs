//! FFmpeg command builder and cancellation-aware runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use vod_models::RequestContext;

use crate::error::{MediaError, MediaResult};

/// Only the tail of the child's chatter is kept for diagnostics.
const MAX_CAPTURE_BYTES: usize = 16 * 1024;

/// How long a SIGTERM'd child gets before SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(5);

/// Builder for ffmpeg invocations.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i <input>`
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn video_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:v").output_arg(bitrate)
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn audio_channels(self, channels: u8) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    pub fn audio_rate(self, hz: u32) -> Self {
        self.output_arg("-ar").output_arg(hz.to_string())
    }

    /// Emit exactly one frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// JPEG quality scale (lower is better).
    pub fn quality(self, q: u8) -> Self {
        self.output_arg("-q:v").output_arg(q.to_string())
    }

    /// Build the full argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-nostdin".to_string()];
        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Run an ffmpeg command to completion.
///
/// Combined stdout+stderr is captured (tail-bounded) and attached to the
/// error on a non-zero exit. Cancellation signals the child with SIGTERM,
/// escalating to SIGKILL after [`TERM_GRACE`].
pub async fn run_ffmpeg(ctx: &RequestContext, cmd: &FfmpegCommand) -> MediaResult<()> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let args = cmd.build_args();
    debug!("running ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take().expect("stdout not captured");
    let stderr = child.stderr.take().expect("stderr not captured");
    let out_task = tokio::spawn(drain_tail(stdout));
    let err_task = tokio::spawn(drain_tail(stderr));

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = ctx.cancel.cancelled() => {
            terminate(&mut child).await;
            return Err(MediaError::Cancelled);
        }
    };

    if status.success() {
        return Ok(());
    }

    let mut diagnostics = out_task.await.unwrap_or_default();
    let err_tail = err_task.await.unwrap_or_default();
    if !err_tail.is_empty() {
        if !diagnostics.is_empty() {
            diagnostics.push('\n');
        }
        diagnostics.push_str(&err_tail);
    }

    Err(MediaError::command_failed(
        "ffmpeg",
        status.code(),
        diagnostics,
    ))
}

/// SIGTERM the child, SIGKILL it if it ignores the grace period.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("failed to SIGTERM child {}: {}", pid, e);
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!("child {} ignored SIGTERM, killing", pid);
    }
    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// Read a stream to the end, keeping only the last [`MAX_CAPTURE_BYTES`].
async fn drain_tail<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > MAX_CAPTURE_BYTES {
                    let cut = tail.len() - MAX_CAPTURE_BYTES;
                    tail.drain(..cut);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Check that ffmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check that ffprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_orders_input_and_output_flags() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4")
            .input_arg("-hwaccel")
            .input_arg("none")
            .video_codec("libx264")
            .video_bitrate("4000k");

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        assert_eq!(args[1], "-nostdin");

        let hw = args.iter().position(|a| a == "-hwaccel").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        let cv = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(hw < i, "input options must precede the input");
        assert!(i < cv, "codec flags must follow the input");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[tokio::test]
    async fn drain_tail_keeps_only_the_tail() {
        let data = vec![b'x'; MAX_CAPTURE_BYTES * 3];
        let tail = drain_tail(&data[..]).await;
        assert_eq!(tail.len(), MAX_CAPTURE_BYTES);
    }

    #[tokio::test]
    async fn drain_tail_preserves_short_output() {
        let tail = drain_tail(&b"frame=  100 fps= 25"[..]).await;
        assert_eq!(tail, "frame=  100 fps= 25");
    }
}
