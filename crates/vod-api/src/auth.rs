//! Caller identity extraction.
//!
//! Token issuance and verification live outside this service; the
//! gateway forwards the authenticated user id in a header, which is all
//! the core reads.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthenticated("missing user identity"))?;

        let user_id = raw
            .parse::<Uuid>()
            .map_err(|_| ApiError::unauthenticated("malformed user identity"))?;

        Ok(AuthUser(user_id))
    }
}
