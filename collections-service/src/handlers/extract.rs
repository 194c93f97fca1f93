use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Tenant id taken from the `x-user-id` header set by the upstream gateway.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing x-user-id header")))?;

        let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
            AppError::BadRequest(anyhow::anyhow!("x-user-id must be a UUID, got '{}'", raw))
        })?;

        tracing::Span::current().record("user_id", raw);

        Ok(UserId(user_id))
    }
}
