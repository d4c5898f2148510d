use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use tower_sessions::Session;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;

/// Session key under which the authenticated user's id is stored.
pub const SESSION_USER_ID_KEY: &str = "user_id";

/// Extractor gating protected routes on a server-side session.
///
/// Rejects with 401 before any handler logic runs; a rejected request never
/// reaches the credential store.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        let user_id: Option<Uuid> = session
            .get(SESSION_USER_ID_KEY)
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        match user_id {
            Some(id) => Ok(AuthUser(id)),
            None => {
                warn!("request without authenticated session");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
