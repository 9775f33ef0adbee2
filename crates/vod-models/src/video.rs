//! Original video records and processing status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a status string from the database is unknown.
#[derive(Debug, Error)]
#[error("unknown video status: {0}")]
pub struct ParseStatusError(pub String);

/// Processing status of an original video.
///
/// Monotone forward during normal operation; a redelivered job may move a
/// video back to `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Ingested, waiting for a consumer
    #[default]
    Queued,
    /// A consumer is working on it
    Processing,
    /// At least one variant was produced
    Processed,
    /// No variant could be produced
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Queued => "queued",
            VideoStatus::Processing => "processing",
            VideoStatus::Processed => "processed",
            VideoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(VideoStatus::Queued),
            "processing" => Ok(VideoStatus::Processing),
            "processed" => Ok(VideoStatus::Processed),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl TryFrom<String> for VideoStatus {
    type Error = ParseStatusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// An immutable ingestion record for an uploaded source video.
///
/// `(bucket, key)` must resolve to a readable object for the lifetime of
/// the record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OriginalVideo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub filename: String,
    /// Storage bucket holding the uploaded source (the owner's bucket)
    pub bucket: String,
    /// Object key of the uploaded source within `bucket`
    pub key: String,
    pub file_size_bytes: i64,
    pub content_type: String,
    /// Source duration in whole seconds, 0 until probed
    pub duration: i32,
    pub width: i32,
    pub height: i32,
    /// Free-form technical attributes
    pub metadata: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub status: VideoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for inserting a new original video at ingest time.
#[derive(Debug, Clone)]
pub struct NewOriginalVideo {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub filename: String,
    pub bucket: String,
    pub key: String,
    pub file_size_bytes: i64,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            VideoStatus::Queued,
            VideoStatus::Processing,
            VideoStatus::Processed,
            VideoStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<VideoStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("done".parse::<VideoStatus>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&VideoStatus::Processed).unwrap();
        assert_eq!(json, "\"processed\"");
    }
}
