//! Worker error types.

use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur while processing a job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("storage error: {0}")]
    Storage(#[from] vod_storage::StorageError),

    #[error("broker error: {0}")]
    Broker(#[from] vod_broker::BrokerError),

    #[error("database error: {0}")]
    Db(#[from] vod_db::DbError),

    #[error("media error: {0}")]
    Media(#[from] vod_media::MediaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job failed: {0}")]
    JobFailed(String),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Whether this error came from cooperative cancellation rather than
    /// a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            WorkerError::Storage(vod_storage::StorageError::Cancelled)
                | WorkerError::Broker(vod_broker::BrokerError::Cancelled)
                | WorkerError::Db(vod_db::DbError::Cancelled)
                | WorkerError::Media(vod_media::MediaError::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_recognized_across_sources() {
        assert!(WorkerError::from(vod_storage::StorageError::Cancelled).is_cancelled());
        assert!(WorkerError::from(vod_media::MediaError::Cancelled).is_cancelled());
        assert!(!WorkerError::job_failed("boom").is_cancelled());
    }
}
