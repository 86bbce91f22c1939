//! Health check endpoints.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

/// Registers health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// 200 once the mount probe has resolved, 503 while the session is still loading.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.session.state().loading {
        let mut response = Response::new(Body::from("LOADING"));
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        return response;
    }
    Response::new(Body::from("OK"))
}
