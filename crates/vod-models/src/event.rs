//! Broker job events and their stream wire encoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error decoding a stream entry into a [`JobEvent`].
///
/// A decode failure marks the entry as poison: the consumer logs it,
/// acknowledges it and moves on.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("empty field: {0}")]
    EmptyField(&'static str),

    #[error("invalid video_id: {0}")]
    InvalidVideoId(String),
}

/// A processing job published at ingest and consumed by the worker.
///
/// Identity is the broker-assigned entry id, not anything in the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Bucket holding the source object (the uploader's bucket)
    pub bucket: String,
    /// Object key of the source within `bucket`
    pub key: String,
    pub video_id: Uuid,
}

impl JobEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, video_id: Uuid) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            video_id,
        }
    }

    /// Encode as stream entry fields.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("bucket", self.bucket.clone()),
            ("key", self.key.clone()),
            ("video_id", self.video_id.to_string()),
        ]
    }

    /// Decode from stream entry fields.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, EventDecodeError> {
        let bucket = require(fields, "bucket")?;
        let key = require(fields, "key")?;
        let video_id = require(fields, "video_id")?;
        let video_id = video_id
            .parse::<Uuid>()
            .map_err(|_| EventDecodeError::InvalidVideoId(video_id.to_string()))?;

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            video_id,
        })
    }
}

fn require<'a>(
    fields: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, EventDecodeError> {
    let value = fields
        .get(name)
        .ok_or(EventDecodeError::MissingField(name))?;
    if value.is_empty() {
        return Err(EventDecodeError::EmptyField(name));
    }
    Ok(value)
}
