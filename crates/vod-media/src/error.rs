//! Error types for media operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving the external transcoder.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("{program} failed with status {exit_code:?}: {diagnostics}")]
    CommandFailed {
        program: &'static str,
        exit_code: Option<i32>,
        /// Tail of the child's combined stdout+stderr
        diagnostics: String,
    },

    #[error("invalid video file: {0}")]
    InvalidVideo(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe output parse error: {0}")]
    ProbeParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn command_failed(
        program: &'static str,
        exit_code: Option<i32>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            program,
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }
}
