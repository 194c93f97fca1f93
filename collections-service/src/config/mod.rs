use chrono::format::{Item, StrftimeItems};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CollectionsConfig {
    pub common: core_config::Config,
    pub database: Option<DatabaseConfig>,
    pub smtp: SmtpConfig,
    pub whatsapp: WhatsAppConfig,
    pub dispatch: DispatchConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// Key expected in `X-Admin-Api-Key` on `/admin` routes. When unset the
    /// admin routes refuse every call.
    pub admin_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_base_url: String,
    pub phone_number_id: String,
    pub access_token: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on a single channel-sender call.
    pub send_timeout: Duration,
    /// chrono format string used for `{{dueDate}}`.
    pub date_format: String,
    /// Concurrent sends per scheduling tick.
    pub tick_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(30),
            date_format: "%d/%m/%Y".to_string(),
            tick_concurrency: 8,
        }
    }
}

impl CollectionsConfig {
    pub fn load() -> Result<Self, AppError> {
        let mut common_config = core_config::Config::load()?;
        if let Ok(level) = env::var("LOG_LEVEL") {
            common_config.log_level = level;
        }
        if let Ok(endpoint) = env::var("OTLP_ENDPOINT") {
            common_config.otlp_endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        // Outside production a missing DATABASE_URL selects the in-memory store.
        let database = match env::var("DATABASE_URL") {
            Ok(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2),
            }),
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )));
            }
            Err(_) => None,
        };

        let admin_api_key = match env::var("ADMIN_API_KEY") {
            Ok(key) if !key.is_empty() => Some(key),
            _ if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ADMIN_API_KEY is required in production but not set"
                )));
            }
            _ => None,
        };

        let defaults = DispatchConfig::default();
        let date_format = env::var("DISPATCH_DATE_FORMAT").unwrap_or(defaults.date_format);
        validate_date_format(&date_format)?;

        Ok(CollectionsConfig {
            common: common_config,
            database,
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", 587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Collections"), is_prod)?,
                enabled: parse_env("SMTP_ENABLED", false),
            },
            whatsapp: WhatsAppConfig {
                api_base_url: get_env(
                    "WHATSAPP_API_BASE_URL",
                    Some("https://graph.facebook.com/v19.0"),
                    false,
                )?,
                phone_number_id: get_env("WHATSAPP_PHONE_NUMBER_ID", Some(""), is_prod)?,
                access_token: get_env("WHATSAPP_ACCESS_TOKEN", Some(""), is_prod)?,
                enabled: parse_env("WHATSAPP_ENABLED", false),
            },
            dispatch: DispatchConfig {
                send_timeout: Duration::from_secs(parse_env(
                    "DISPATCH_SEND_TIMEOUT_SECS",
                    defaults.send_timeout.as_secs(),
                )),
                date_format,
                tick_concurrency: parse_env("DISPATCH_TICK_CONCURRENCY", defaults.tick_concurrency)
                    .max(1),
            },
            security: SecurityConfig { admin_api_key },
        })
    }
}

/// Rejects chrono format strings with unknown specifiers.
pub fn validate_date_format(format: &str) -> Result<(), AppError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "DISPATCH_DATE_FORMAT {:?} is not a valid date format",
            format
        )));
    }
    Ok(())
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
