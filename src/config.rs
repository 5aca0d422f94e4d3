use chrono::Duration;
use dotenv::dotenv;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use crate::error::ConfigError;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_LEDGER_PATH: &str = "/app/data/bookings.csv";
const DEFAULT_SCHEDULE_PATH: &str = "/app/data/schedule.json";
const MIN_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the external calendar provider.
#[derive(Debug, Clone)]
pub struct CalendarSettings {
    pub endpoint: String,
    pub key_id: String,
    pub secret: String,
}

/// Outbound notification webhook (the email service boundary).
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub webhook_url: String,
    pub signing_secret: String,
}

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: SocketAddr,
    pub ledger_path: PathBuf,
    pub schedule_path: PathBuf,
    pub slot_step: Duration,
    pub minimum_notice: Duration,
    pub recency_window: Duration,
    pub max_query_span: Duration,
    pub side_effect_timeout: std::time::Duration,
    pub is_production: bool,
    pub admin_token: Option<String>,
    pub calendar: Option<CalendarSettings>,
    pub notification: Option<NotificationSettings>,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_address = get("BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDRESS",
                reason: e.to_string(),
            })?;

        let slot_step = minutes(&get, "SLOT_STEP_MINUTES", 30, 1, 24 * 60)?;
        let minimum_notice = minutes(&get, "MINIMUM_BOOKING_NOTICE_MINUTES", 120, 0, 60 * 24 * 365)?;
        let recency_days = number(&get, "RECENT_CUSTOMER_WINDOW_DAYS", 30, 0, 3650)?;
        let max_query_days = number(&get, "MAX_QUERY_DAYS", 62, 1, 366)?;
        let side_effect_secs = number(&get, "SIDE_EFFECT_TIMEOUT_SECS", 10, 1, 300)?;

        let is_production = get("ENVIRONMENT")
            .map(|val| val.to_lowercase() == "production")
            .unwrap_or(false);

        let calendar = match (
            get("CALENDAR_API_ENDPOINT"),
            get("CALENDAR_API_KEY_ID"),
            get("CALENDAR_API_SECRET"),
        ) {
            (Some(endpoint), Some(key_id), Some(secret)) => Some(CalendarSettings {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                key_id,
                secret,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "CALENDAR_API_ENDPOINT",
                    "CALENDAR_API_KEY_ID and CALENDAR_API_SECRET",
                ))
            }
        };

        let notification = match (
            get("NOTIFICATION_WEBHOOK_URL"),
            get("NOTIFICATION_SIGNING_SECRET"),
        ) {
            (Some(webhook_url), Some(signing_secret)) => Some(NotificationSettings {
                webhook_url,
                signing_secret,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "NOTIFICATION_WEBHOOK_URL",
                    "NOTIFICATION_SIGNING_SECRET",
                ))
            }
        };

        Ok(Self {
            bind_address,
            ledger_path: get("BOOKING_LEDGER_PATH")
                .unwrap_or_else(|| DEFAULT_LEDGER_PATH.to_string())
                .into(),
            schedule_path: get("SCHEDULE_CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_SCHEDULE_PATH.to_string())
                .into(),
            slot_step,
            minimum_notice,
            recency_window: Duration::days(recency_days),
            max_query_span: Duration::days(max_query_days),
            side_effect_timeout: std::time::Duration::from_secs(side_effect_secs as u64),
            is_production,
            admin_token: get("ADMIN_API_TOKEN"),
            calendar,
            notification,
        })
    }

    /// Whole-request deadline. An admission awaits the busy-period fetch and
    /// the calendar event, each bounded by `side_effect_timeout`, so the
    /// deadline always leaves room for both.
    pub fn request_timeout(&self) -> std::time::Duration {
        let side_effects = self.side_effect_timeout * 2 + std::time::Duration::from_secs(10);
        side_effects.max(std::time::Duration::from_secs(MIN_REQUEST_TIMEOUT_SECS))
    }

    /// Log the effective settings without secrets.
    pub fn log_summary(&self) {
        info!(
            "Slot step {} min, minimum notice {} min, recency window {} days",
            self.slot_step.num_minutes(),
            self.minimum_notice.num_minutes(),
            self.recency_window.num_days()
        );
        info!(
            "Ledger at {}, schedule catalog at {}",
            self.ledger_path.display(),
            self.schedule_path.display()
        );

        match &self.calendar {
            Some(calendar) => info!("Calendar integration enabled at {}", calendar.endpoint),
            None => info!("No calendar provider configured - busy periods and events disabled"),
        }

        if self.notification.is_some() {
            info!("Notification webhook enabled");
        } else {
            info!("No notification webhook configured - notifications will be logged only");
        }

        if self.admin_token.is_some() {
            info!("Admin API enabled with bearer token");
        } else {
            info!("No admin token provided - admin API disabled");
        }
    }
}

fn number<G>(get: &G, key: &'static str, default: i64, min: i64, max: i64) -> Result<i64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = match get(key) {
        Some(raw) => raw.trim().parse::<i64>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?,
        None => default,
    };

    if value < min || value > max {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("{} is outside {}..={}", value, min, max),
        });
    }

    Ok(value)
}

fn minutes<G>(get: &G, key: &'static str, default: i64, min: i64, max: i64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    number(get, key, default, min, max).map(Duration::minutes)
}
