pub mod clock;
pub mod debts;
pub mod dispatch;
pub mod engine;
pub mod metrics;
pub mod providers;
pub mod quota;
pub mod reconciliation;
pub mod renderer;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod tenants;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{CollectionsEngine, TickFailure, TickReport, TickSent};
pub use metrics::{get_metrics, init_metrics};
pub use providers::{
    ChannelSender, MockBehavior, MockSender, OutboundMessage, ProviderError, ProviderResponse,
    SenderRegistry, SmtpEmailSender, WhatsAppCloudSender,
};
pub use quota::{QuotaReservation, QuotaTracker};
pub use store::{CollectionsStore, MemoryStore, PgStore};
pub use tenants::{StoreTenantDirectory, TenantDirectory};
