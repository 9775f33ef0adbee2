//! Service layer.

pub mod ingest;

pub use ingest::{IngestService, StagedUpload, UploadRequest};
