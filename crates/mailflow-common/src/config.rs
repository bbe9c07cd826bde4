//! Configuration for Mailflow

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Business hours calendar
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,

    /// Outbound SMTP configuration (reply action)
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Webhook collaborators (tasks, notifications, mailbox control)
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (PostgreSQL)
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Automation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Consecutive primary failures before a rule trips to ERROR
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    /// Maximum delivery attempts for a transient primary-action failure
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Base backoff between delivery retries, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Whether run-all rule kinds pass through the cooldown tracker
    #[serde(default = "default_throttle_run_all")]
    pub throttle_run_all: bool,

    /// Retention floor for cooldown entries, in seconds
    #[serde(default = "default_cooldown_retention_secs")]
    pub cooldown_retention_secs: u64,

    /// Interval between scheduler ticks (deferred/delayed work), in seconds
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: default_breaker_threshold(),
            max_delivery_attempts: default_max_delivery_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            throttle_run_all: default_throttle_run_all(),
            cooldown_retention_secs: default_cooldown_retention_secs(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_max_delivery_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_throttle_run_all() -> bool {
    true
}

fn default_cooldown_retention_secs() -> u64 {
    7 * 24 * 3600
}

fn default_tick_interval_secs() -> u64 {
    5
}

/// Organization business-hours calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessHoursConfig {
    /// IANA timezone name
    #[serde(default = "default_business_timezone")]
    pub timezone: String,

    /// Opening hour (0-23)
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,

    /// Closing hour (0-23, exclusive)
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,

    /// Working days, 0 = Monday .. 6 = Sunday
    #[serde(default = "default_work_days")]
    pub work_days: Vec<u8>,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            timezone: default_business_timezone(),
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
            work_days: default_work_days(),
        }
    }
}

fn default_business_timezone() -> String {
    "UTC".to_string()
}

fn default_open_hour() -> u32 {
    9
}

fn default_close_hour() -> u32 {
    17
}

fn default_work_days() -> Vec<u8> {
    vec![0, 1, 2, 3, 4]
}

/// Outbound SMTP configuration for reply delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Address replies are sent from
    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default)]
    pub use_tls: bool,

    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// Send timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            from_address: default_from_address(),
            use_tls: false,
            use_starttls: default_use_starttls(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_from_address() -> String {
    "automation@localhost".to_string()
}

fn default_use_starttls() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Webhook endpoints for auxiliary-action collaborators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Task-creation service endpoint
    pub task_url: Option<String>,

    /// Notification service endpoint
    pub notify_url: Option<String>,

    /// Mailbox control endpoint (mark read / add label)
    pub mailbox_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    10
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailflow/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }

    /// Sanity-check values serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.business_hours.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(crate::Error::Config(format!(
                "Unknown business_hours.timezone: {:?}",
                self.business_hours.timezone
            )));
        }
        if self.business_hours.open_hour >= 24 || self.business_hours.close_hour > 24 {
            return Err(crate::Error::Config(
                "business_hours hours must be within 0-24".to_string(),
            ));
        }
        if self.business_hours.work_days.iter().any(|d| *d > 6) {
            return Err(crate::Error::Config(
                "business_hours.work_days entries must be 0-6".to_string(),
            ));
        }
        if self.engine.max_delivery_attempts == 0 {
            return Err(crate::Error::Config(
                "engine.max_delivery_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
