use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_STATUS_URL: &str = "https://rpi1.eagle3dstreaming.com/api/nodes";
pub const STATUS_TIMEOUT_SECS: u64 = 10;
pub const STATUS_REFRESH_SECS: u64 = 60;
pub const DEGRADED_THRESHOLD: u32 = 5; // consecutive failed polls before warning
pub const ACTION_MAX_ATTEMPTS: u32 = 5;
pub const ACTION_RETRY_DELAY_MS: u64 = 500;
pub const ACTION_TIMEOUT_SECS: u64 = 10;
pub const TICK_INTERVAL_SECS: u64 = 60;

/// Top-level config (nodepilot.toml + NODEPILOT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodepilotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Remote node-status source polled by the status cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_status_url")]
    pub url: String,
    /// Per-poll request timeout.
    #[serde(default = "default_status_timeout")]
    pub timeout_secs: u64,
    /// Cadence of the standalone refresh loop, independent of scheduler ticks.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Consecutive failures after which a degraded-service warning is logged.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            url: default_status_url(),
            timeout_secs: STATUS_TIMEOUT_SECS,
            refresh_interval_secs: STATUS_REFRESH_SECS,
            degraded_threshold: DEGRADED_THRESHOLD,
        }
    }
}

/// Start/stop endpoint invocation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_action_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            max_attempts: ACTION_MAX_ATTEMPTS,
            retry_delay_ms: ACTION_RETRY_DELAY_MS,
            request_timeout_secs: ACTION_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default)]
    pub clock: ClockMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: TICK_INTERVAL_SECS,
            clock: ClockMode::default(),
        }
    }
}

/// Which wall clock schedule times are compared against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Host local time.
    #[default]
    Local,
    Utc,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_status_url() -> String {
    DEFAULT_STATUS_URL.to_string()
}
fn default_status_timeout() -> u64 {
    STATUS_TIMEOUT_SECS
}
fn default_refresh_interval() -> u64 {
    STATUS_REFRESH_SECS
}
fn default_degraded_threshold() -> u32 {
    DEGRADED_THRESHOLD
}
fn default_max_attempts() -> u32 {
    ACTION_MAX_ATTEMPTS
}
fn default_retry_delay() -> u64 {
    ACTION_RETRY_DELAY_MS
}
fn default_action_timeout() -> u64 {
    ACTION_TIMEOUT_SECS
}
fn default_tick_interval() -> u64 {
    TICK_INTERVAL_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.nodepilot/nodepilot.db", home)
}

impl NodepilotConfig {
    /// Load config from a TOML file with NODEPILOT_* env var overrides.
    ///
    /// A missing file is not an error: every section falls back to its
    /// defaults. Nested keys in env vars are separated by a double
    /// underscore, e.g. `NODEPILOT_STATUS__TIMEOUT_SECS=5`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: NodepilotConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("NODEPILOT_").split("__"))
            .extract()
            .map_err(|e| crate::error::NodepilotError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.nodepilot/nodepilot.toml", home)
}
