use crate::startup::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

pub const ADMIN_API_KEY_HEADER: &str = "x-admin-api-key";

/// Guards operator routes. Without a configured key every call is refused.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get(ADMIN_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match (api_key, state.admin_api_key.as_deref()) {
        (Some(key), Some(expected)) if key == expected => next.run(request).await,
        _ => {
            tracing::warn!("Failed admin authentication attempt");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Unauthorized: Invalid or missing admin API key",
                    "code": "unauthorized"
                })),
            )
                .into_response()
        }
    }
}
