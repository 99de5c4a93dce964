use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::dto::{LoginFlag, MyId, RefreshRequest, VerifyRequest};
use super::extractors::{AuthUser, MaybeAuthUser};
use super::jwt::TokenPair;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::handlers::{json_body, optional_json_body};
use crate::users::validation::{ErrorCode, FieldErrors, FieldName};
use crate::users::{dto::LoginRequest, services};

pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/token", post(obtain_pair))
        .route("/token/refresh", post(refresh))
        .route("/token/verify", post(verify))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/is_login", get(is_login))
        .route("/users/me", get(me))
}

/// Always 200 for anonymous or authenticated callers; a bad token is 401
/// through the extractor.
#[instrument(skip_all)]
pub async fn is_login(MaybeAuthUser(user): MaybeAuthUser) -> Json<LoginFlag> {
    Json(LoginFlag {
        login_flg: user.is_some(),
    })
}

#[instrument(skip_all)]
pub async fn me(AuthUser(user_id): AuthUser) -> Json<MyId> {
    Json(MyId { id: user_id })
}

#[instrument(skip(state, payload))]
pub async fn obtain_pair(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = services::obtain_token_pair(&state, json_body(payload)?).await?;
    Ok(Json(pair))
}

/// A token field taken from the body: missing or blank is a field error.
fn required_token(field: FieldName, value: Option<String>) -> Result<String, ApiError> {
    match value {
        None => Err(ApiError::Validation(FieldErrors::single(field, ErrorCode::Require))),
        Some(v) if v.trim().is_empty() => {
            Err(ApiError::Validation(FieldErrors::single(field, ErrorCode::Blank)))
        }
        Some(v) => Ok(v),
    }
}

/// Mints a fresh pair from a refresh token. The refresh token is rotated and
/// both cookies are rewritten. Without a body the refresh cookie is used.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, HeaderMap, Json<TokenPair>), ApiError> {
    let req: RefreshRequest = optional_json_body(&body)?;
    let token = required_token(
        FieldName::Refresh,
        req.refresh
            .or_else(|| state.session.refresh_from_cookie(&headers)),
    )?;
    let claims = state.keys.verify_refresh(&token)?;
    let pair = state.keys.issue_pair(claims.sub)?;
    let mut out = HeaderMap::new();
    state.session.attach(&pair, &mut out)?;
    info!(user_id = %claims.sub, "token pair refreshed");
    Ok((StatusCode::OK, out, Json(pair)))
}

#[instrument(skip_all)]
pub async fn verify(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: VerifyRequest = optional_json_body(&body)?;
    let token = required_token(FieldName::Token, req.token)?;
    state.keys.verify(&token)?;
    Ok(Json(json!({})))
}
