//! Subscription plans and WhatsApp quota counters.

use super::Channel;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "basic" => PlanTier::Basic,
            "pro" => PlanTier::Pro,
            "enterprise" => PlanTier::Enterprise,
            _ => PlanTier::Free,
        }
    }

    /// Monthly WhatsApp messages included in the plan.
    pub fn whatsapp_limit(&self) -> i64 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Basic => 100,
            PlanTier::Pro => 1_000,
            PlanTier::Enterprise => 10_000,
        }
    }
}

/// Plan information returned by the billing lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PlanInfo {
    pub tier: PlanTier,
    pub whatsapp_limit_override: Option<i64>,
}

impl PlanInfo {
    pub fn new(tier: PlanTier) -> Self {
        Self {
            tier,
            whatsapp_limit_override: None,
        }
    }

    pub fn whatsapp_limit(&self) -> i64 {
        self.whatsapp_limit_override
            .unwrap_or_else(|| self.tier.whatsapp_limit())
    }
}

/// Names used when rendering messages on behalf of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TenantProfile {
    pub user_name: String,
    pub company_name: String,
}

/// Stored plan and profile of one tenant. Tenants without a row are on
/// the free plan with an empty profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantAccount {
    pub user_id: Uuid,
    pub plan: PlanInfo,
    pub profile: TenantProfile,
    pub updated_utc: DateTime<Utc>,
}

impl TenantAccount {
    pub fn new(user_id: Uuid, plan: PlanInfo, profile: TenantProfile) -> Self {
        Self {
            user_id,
            plan,
            profile,
            updated_utc: Utc::now(),
        }
    }
}

/// Calendar month a quota counter belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuotaPeriod {
    pub year: i32,
    pub month: u32,
}

impl QuotaPeriod {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Storage key, e.g. `2024-04`.
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let (year, month) = key.split_once('-')?;
        let month: u32 = month.parse().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self {
            year: year.parse().ok()?,
            month,
        })
    }
}

impl std::fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Usage for one (user, channel, month). `reserved` counts sends in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaCounter {
    pub user_id: Uuid,
    pub channel: Channel,
    pub period: QuotaPeriod,
    pub used: i64,
    pub reserved: i64,
}

impl QuotaCounter {
    pub fn empty(user_id: Uuid, channel: Channel, period: QuotaPeriod) -> Self {
        Self {
            user_id,
            channel,
            period,
            used: 0,
            reserved: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaStatus {
    pub user_id: Uuid,
    pub tier: PlanTier,
    pub period: String,
    pub whatsapp_limit: i64,
    pub whatsapp_used: i64,
    pub whatsapp_reserved: i64,
    pub whatsapp_remaining: i64,
    pub email_unmetered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_limits_match_tiers() {
        assert_eq!(PlanInfo::new(PlanTier::Free).whatsapp_limit(), 0);
        assert_eq!(PlanInfo::new(PlanTier::Basic).whatsapp_limit(), 100);
        assert_eq!(PlanInfo::new(PlanTier::Pro).whatsapp_limit(), 1_000);
        assert_eq!(PlanInfo::new(PlanTier::Enterprise).whatsapp_limit(), 10_000);
    }

    #[test]
    fn override_replaces_tier_limit() {
        let plan = PlanInfo {
            tier: PlanTier::Basic,
            whatsapp_limit_override: Some(5),
        };
        assert_eq!(plan.whatsapp_limit(), 5);
    }

    #[test]
    fn period_key_parses_back() {
        let date = NaiveDate::from_ymd_opt(2024, 4, 17).unwrap();
        let period = QuotaPeriod::containing(date);
        assert_eq!(period.key(), "2024-04");
        assert_eq!(QuotaPeriod::from_key("2024-04"), Some(period));
        assert_eq!(QuotaPeriod::from_key("2024-13"), None);
    }
}
