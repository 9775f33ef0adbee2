//! Health check handler.

use axum::Json;

use crate::error::Envelope;

pub async fn health() -> Json<Envelope<&'static str>> {
    Json(Envelope::success("ok"))
}
