use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{patch, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tracing::instrument;
use uuid::Uuid;

use super::dto::{LoginRequest, PublicUser, SignupRequest, UpdateRequest};
use super::services;
use crate::auth::extractors::{AuthUser, MaybeAuthUser};
use crate::error::ApiError;
use crate::state::AppState;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/update/:id", patch(update))
}

/// Unwraps a JSON body, turning axum's rejection into our 400 shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// JSON body that may be left out entirely. An empty body reads as
/// `T::default()`; anything else must parse.
pub(crate) fn optional_json_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Failed to parse the request body as JSON: {e}")))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<PublicUser>), ApiError> {
    let (user, pair) = services::signup(&state, json_body(payload)?).await?;
    let mut headers = HeaderMap::new();
    state.session.attach(&pair, &mut headers)?;
    Ok((StatusCode::CREATED, headers, Json(PublicUser::from(&user))))
}

#[instrument(skip(state, current, payload))]
pub async fn login(
    State(state): State<AppState>,
    MaybeAuthUser(current): MaybeAuthUser,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<PublicUser>), ApiError> {
    // Already-authenticated callers are refused before the body is looked at.
    let req = match current {
        Some(_) => LoginRequest::default(),
        None => json_body(payload)?,
    };
    let (user, pair) = services::login(&state, current, req).await?;
    let mut headers = HeaderMap::new();
    state.session.attach(&pair, &mut headers)?;
    Ok((StatusCode::CREATED, headers, Json(PublicUser::from(&user))))
}

#[instrument(skip(state, body))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<PublicUser>, ApiError> {
    let req: UpdateRequest = optional_json_body(&body)?;
    let user = services::update(&state, caller, id, req).await?;
    Ok(Json(PublicUser::from(&user)))
}
