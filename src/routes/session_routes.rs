//! Session endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::AuthState;
use crate::state::AppState;
use crate::utils::HTTPError;

/// Registers session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/sign-in", post(sign_in))
        .route("/session/sign-up", post(sign_up))
        .route("/session/sign-out", post(sign_out))
        .route("/session/refresh-profile", post(refresh_profile))
}

#[derive(Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub state: AuthState,
    pub token_refresh_count: u64,
}

#[derive(Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignUpRequest {
    email: String,
    password: String,
    full_name: String,
}

#[derive(Serialize)]
struct SignUpResponse {
    registered: bool,
}

fn snapshot(state: &AppState) -> Json<SessionResponse> {
    Json(SessionResponse {
        state: state.session.state(),
        token_refresh_count: state.session.token_refresh_count(),
    })
}

/// Current auth state, once the mount probe has resolved.
async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    state.session.wait_until_loaded().await;
    snapshot(&state)
}

/// Credentials go to the provider; the state returned is the one after the
/// resulting `SIGNED_IN` has been processed.
async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SessionResponse>, HTTPError> {
    state
        .session
        .sign_in(&request.email, &request.password)
        .await
        .map_err(HTTPError::unauthorized)?;
    state.session.settle().await;
    Ok(snapshot(&state))
}

async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), HTTPError> {
    state
        .session
        .sign_up(&request.email, &request.password, &request.full_name)
        .await
        .map_err(HTTPError::bad_request)?;
    Ok((StatusCode::CREATED, Json(SignUpResponse { registered: true })))
}

async fn sign_out(State(state): State<AppState>) -> Json<SessionResponse> {
    state.session.sign_out().await;
    state.session.settle().await;
    snapshot(&state)
}

async fn refresh_profile(State(state): State<AppState>) -> Json<SessionResponse> {
    state.session.refresh_profile().await;
    snapshot(&state)
}
