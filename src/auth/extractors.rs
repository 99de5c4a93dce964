use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Caller identity when a token may or may not be present.
///
/// `None` means no token was sent. A token that fails verification rejects
/// the request with 401 instead of falling back to anonymous.
pub struct MaybeAuthUser(pub Option<Uuid>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = state.session.extract(&parts.headers)? else {
            return Ok(MaybeAuthUser(None));
        };
        let claims = state.keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::from(e)
        })?;
        Ok(MaybeAuthUser(Some(claims.sub)))
    }
}

/// Extracts and validates the access token, returning the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match MaybeAuthUser::from_request_parts(parts, state).await? {
            MaybeAuthUser(Some(user_id)) => Ok(AuthUser(user_id)),
            MaybeAuthUser(None) => Err(ApiError::NotAuthenticated),
        }
    }
}
