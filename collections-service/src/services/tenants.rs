//! Tenant plan and profile lookup.

use super::store::CollectionsStore;
use crate::error::CollectionsError;
use crate::models::{PlanInfo, TenantAccount, TenantProfile};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Answers which plan a tenant is on and how it names itself in messages.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn plan(&self, user_id: Uuid) -> Result<PlanInfo, CollectionsError>;
    async fn profile(&self, user_id: Uuid) -> Result<TenantProfile, CollectionsError>;
}

/// Directory persisted through the collections store. Unknown tenants are
/// on the free plan with an empty profile.
#[derive(Clone)]
pub struct StoreTenantDirectory {
    store: Arc<dyn CollectionsStore>,
}

impl StoreTenantDirectory {
    pub fn new(store: Arc<dyn CollectionsStore>) -> Self {
        Self { store }
    }

    /// Replaces the tenant's plan and profile.
    #[instrument(skip(self, profile))]
    pub async fn upsert(
        &self,
        user_id: Uuid,
        plan: PlanInfo,
        profile: TenantProfile,
    ) -> Result<TenantAccount, CollectionsError> {
        let account = TenantAccount::new(user_id, plan, profile);
        self.store.put_tenant(&account).await?;
        info!(
            tier = account.plan.tier.as_str(),
            whatsapp_limit = account.plan.whatsapp_limit(),
            "Tenant plan updated"
        );
        Ok(account)
    }

    async fn account(&self, user_id: Uuid) -> Result<Option<TenantAccount>, CollectionsError> {
        self.store.get_tenant(user_id).await
    }
}

#[async_trait]
impl TenantDirectory for StoreTenantDirectory {
    async fn plan(&self, user_id: Uuid) -> Result<PlanInfo, CollectionsError> {
        Ok(self
            .account(user_id)
            .await?
            .map(|t| t.plan)
            .unwrap_or_default())
    }

    async fn profile(&self, user_id: Uuid) -> Result<TenantProfile, CollectionsError> {
        Ok(self
            .account(user_id)
            .await?
            .map(|t| t.profile)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanTier;
    use crate::services::MemoryStore;

    #[tokio::test]
    async fn unknown_tenant_is_free() {
        let directory = StoreTenantDirectory::new(Arc::new(MemoryStore::new()));
        let plan = directory.plan(Uuid::new_v4()).await.unwrap();
        assert_eq!(plan.tier, PlanTier::Free);
        assert_eq!(plan.whatsapp_limit(), 0);
    }

    #[tokio::test]
    async fn upsert_survives_a_new_directory_over_the_same_store() {
        let store: Arc<dyn CollectionsStore> = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        StoreTenantDirectory::new(store.clone())
            .upsert(
                user,
                PlanInfo::new(PlanTier::Pro),
                TenantProfile {
                    user_name: "Asha".into(),
                    company_name: "Acme".into(),
                },
            )
            .await
            .unwrap();

        let reopened = StoreTenantDirectory::new(store);
        assert_eq!(reopened.plan(user).await.unwrap().tier, PlanTier::Pro);
        assert_eq!(reopened.profile(user).await.unwrap().company_name, "Acme");
    }
}
