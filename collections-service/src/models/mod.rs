//! Domain models for collections-service.

mod customer;
mod debt;
mod quota;
mod reminder;
mod response;
mod settings;
mod template;

pub use customer::{CreateCustomer, Customer};
pub use debt::{CreateDebt, Debt, DebtStatus, PaymentEvent};
pub use quota::{
    PlanInfo, PlanTier, QuotaCounter, QuotaPeriod, QuotaStatus, TenantAccount, TenantProfile,
};
pub use reminder::{Reminder, ReminderStatus};
pub use response::{CustomerResponse, ResponseStatus, SubmitClaim};
pub use settings::{ReminderSettings, UpdateReminderSettings};
pub use template::{Channel, CreateTemplate, Template};
