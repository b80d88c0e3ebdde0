use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, MessageResponse, SignInRequest, SignUpRequest, UpdateProfileRequest},
        extractors::AuthUser,
        repo_types::User,
        services,
    },
    error::AuthError,
    response::ApiJson,
    state::AppState,
};

type ApiResult<T> = Result<ApiJson<T>, AuthError>;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/signout", post(sign_out))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_profile))
        .route("/user/profile", get(get_profile).put(update_profile))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "invalid request body");
        AuthError::validation("Invalid request body")
    })
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> ApiResult<AuthResponse> {
    let req = body(payload)?;
    let res = services::register(state.users.as_ref(), &state.tokens, req).await?;
    Ok(ApiJson(StatusCode::CREATED, res))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> ApiResult<AuthResponse> {
    let req = body(payload)?;
    let res = services::authenticate(state.users.as_ref(), &state.tokens, req).await?;
    Ok(ApiJson(StatusCode::OK, res))
}

#[instrument]
pub async fn sign_out() -> ApiJson<MessageResponse> {
    ApiJson(StatusCode::OK, services::sign_out())
}

#[instrument(skip(state, claims), fields(user_id = %claims.user_id))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> ApiResult<User> {
    let user = services::profile(state.users.as_ref(), claims.user_id).await?;
    Ok(ApiJson(StatusCode::OK, user))
}

#[instrument(skip(state, claims, payload), fields(user_id = %claims.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<User> {
    let req = body(payload)?;
    let user = services::update_profile(state.users.as_ref(), claims.user_id, req).await?;
    Ok(ApiJson(StatusCode::OK, user))
}
