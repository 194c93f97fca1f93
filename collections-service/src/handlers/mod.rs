//! HTTP handlers for collections-service. The calling tenant is carried in
//! the `x-user-id` header.

pub mod claims;
pub mod debts;
pub mod extract;
pub mod health;
pub mod quota;
pub mod reminders;
pub mod scheduler;
pub mod settings;
pub mod tenant;

pub use extract::{UserId, USER_ID_HEADER};
pub use health::{health_check, metrics_endpoint, readiness_check};
