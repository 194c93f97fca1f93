//! Application startup and lifecycle management.

use crate::config::{CollectionsConfig, DispatchConfig};
use crate::handlers::{self, claims, debts, quota, reminders, scheduler, settings, tenant};
use crate::middleware::admin_auth_middleware;
use crate::models::Channel;
use crate::services::{
    ChannelSender, Clock, CollectionsEngine, CollectionsStore, MemoryStore, MockSender, PgStore,
    SenderRegistry, SmtpEmailSender, StoreTenantDirectory, SystemClock, WhatsAppCloudSender,
};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CollectionsEngine>,
    pub senders: SenderRegistry,
    pub tenants: Arc<StoreTenantDirectory>,
    pub admin_api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CollectionsStore>,
        senders: SenderRegistry,
        clock: Arc<dyn Clock>,
        dispatch: DispatchConfig,
        admin_api_key: Option<String>,
    ) -> Self {
        let tenants = Arc::new(StoreTenantDirectory::new(store.clone()));
        let engine = CollectionsEngine::new(store, tenants.clone(), senders.clone(), clock, dispatch);
        Self {
            engine: Arc::new(engine),
            senders,
            tenants,
            admin_api_key: admin_api_key.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    // Operator routes: plans, quota resets and the scheduling timer.
    let admin_routes = Router::new()
        .route("/admin/tenants/:user_id", put(tenant::put_tenant))
        .route("/admin/quota/reset", post(quota::reset_quotas))
        .route("/admin/scheduler/tick", post(scheduler::run_tick))
        .layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/customers", post(debts::create_customer))
        .route("/debts", post(debts::create_debt))
        .route("/debts/:id", get(debts::get_debt))
        .route("/debts/:id/payments", post(debts::record_payment))
        .route("/debts/:id/mark-paid", post(debts::mark_paid))
        .route("/debts/:id/refresh", post(debts::refresh_status))
        .route(
            "/debts/:id/reminders",
            post(reminders::send_reminder).get(reminders::list_reminders),
        )
        .route("/reminders/:id/delivered", post(reminders::mark_delivered))
        .route("/debts/:id/claims", post(claims::submit_claim))
        .route("/responses/:id", get(claims::get_response))
        .route("/responses/:id/verify", post(claims::verify_claim))
        .route("/responses/:id/reject", post(claims::reject_claim))
        .route("/templates", post(settings::create_template))
        .route("/templates/default", get(settings::default_template))
        .route(
            "/settings/reminders",
            get(settings::get_reminder_settings).put(settings::put_reminder_settings),
        )
        .route("/quota", get(quota::quota_status))
        .merge(admin_routes)
        .route_layer(from_fn(metrics_middleware))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Real providers where enabled, mocks otherwise.
fn build_senders(config: &CollectionsConfig) -> SenderRegistry {
    let email: Arc<dyn ChannelSender> = if config.smtp.enabled {
        match SmtpEmailSender::new(config.smtp.clone()) {
            Ok(sender) => {
                tracing::info!("SMTP email sender initialized");
                Arc::new(sender)
            }
            Err(e) => {
                tracing::warn!("Failed to initialize SMTP sender: {}. Using mock.", e);
                Arc::new(MockSender::new(Channel::Email))
            }
        }
    } else {
        tracing::info!("SMTP sender disabled, using mock email sender");
        Arc::new(MockSender::new(Channel::Email))
    };

    let whatsapp: Arc<dyn ChannelSender> = if config.whatsapp.enabled {
        tracing::info!("WhatsApp Cloud API sender initialized");
        Arc::new(WhatsAppCloudSender::new(config.whatsapp.clone()))
    } else {
        tracing::info!("WhatsApp sender disabled, using mock WhatsApp sender");
        Arc::new(MockSender::new(Channel::Whatsapp))
    };

    SenderRegistry::new().with(email).with(whatsapp)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: CollectionsConfig) -> Result<Self, AppError> {
        let store: Arc<dyn CollectionsStore> = match &config.database {
            Some(db) => {
                let store = PgStore::connect(&db.url, db.max_connections, db.min_connections)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to connect to PostgreSQL: {}", e);
                        AppError::from(e)
                    })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!("Failed to run migrations: {}", e);
                    AppError::from(e)
                })?;
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        if config.security.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set, admin routes are disabled");
        }

        let state = AppState::new(
            store,
            build_senders(&config),
            Arc::new(SystemClock),
            config.dispatch.clone(),
            config.security.admin_api_key.clone(),
        );

        Self::build_with_state(config.common.port, state).await
    }

    /// Bind `port` (0 picks a free one) and serve `state`.
    pub async fn build_with_state(port: u16, state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Collections service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, router(self.state)).await
    }

    /// Run until `signal` resolves, then drain in-flight requests.
    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
    }
}
