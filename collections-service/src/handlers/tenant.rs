use crate::models::{PlanInfo, PlanTier, TenantProfile};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTenantRequest {
    pub tier: PlanTier,
    #[validate(range(min = 0, message = "Limit override cannot be negative"))]
    pub whatsapp_limit_override: Option<i64>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub company_name: String,
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub user_id: Uuid,
    pub plan: PlanInfo,
    pub whatsapp_limit: i64,
    pub profile: TenantProfile,
}

/// Operator route: stores a tenant's plan and the display names used in
/// its messages.
#[tracing::instrument(skip(state, request))]
pub async fn put_tenant(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateTenantRequest>,
) -> Result<Json<TenantResponse>, AppError> {
    request.validate()?;

    let plan = PlanInfo {
        tier: request.tier,
        whatsapp_limit_override: request.whatsapp_limit_override,
    };
    let profile = TenantProfile {
        user_name: request.user_name,
        company_name: request.company_name,
    };
    let account = state.tenants.upsert(user_id, plan, profile).await?;

    Ok(Json(TenantResponse {
        user_id,
        whatsapp_limit: account.plan.whatsapp_limit(),
        plan: account.plan,
        profile: account.profile,
    }))
}
