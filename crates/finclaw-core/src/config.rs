//! FinClaw configuration system.
//!
//! Loaded from `~/.finclaw/config.toml`. Every section is optional; a missing
//! file yields the defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{FinClawError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinClawConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Recurring schedules, seeded into the ledger database on startup.
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
    /// HTTP bridge executors, one per scheduler type.
    #[serde(default)]
    pub executors: Vec<ExecutorEntry>,
}

fn default_data_dir() -> String { "~/.finclaw".into() }
fn default_db_path() -> String { "~/.finclaw/scheduler.db".into() }

impl Default for FinClawConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_path: default_db_path(),
            scheduler: SchedulerConfig::default(),
            gateway: GatewayConfig::default(),
            schedules: Vec::new(),
            executors: Vec::new(),
        }
    }
}

impl FinClawConfig {
    /// Load config from the default path (~/.finclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FinClawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)?;
        config.scheduler.validate()?;
        tracing::debug!("📄 Config loaded from {}", path.display());
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FinClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the FinClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".finclaw")
    }

    /// Ledger database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }

    /// Data directory with `~` expanded.
    pub fn resolved_data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }
}

/// Scheduler tunables. Also the payload persisted by `set_settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Start the coordinator and sweeper loops when the daemon boots.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Failed attempts allowed before an intent stays failed for good.
    #[serde(default = "default_max_retries", alias = "retry_count")]
    pub max_retries: u32,
    /// Delay between a failure and the automatic reopen.
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: u32,
    /// Length of the on-time execution window after the scheduled time.
    #[serde(default = "default_grace_period_minutes")]
    pub grace_period_minutes: u32,
    /// Running longer than this is treated as a dead executor.
    #[serde(default = "default_stuck_threshold_minutes")]
    pub stuck_threshold_minutes: u32,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Upper bound on concurrently running executors.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Optional tighter limit per scheduler type (e.g. one bank session at a time).
    #[serde(default)]
    pub per_type_limits: BTreeMap<String, usize>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Run retention once a day from the sweeper loop.
    #[serde(default = "bool_true")]
    pub auto_cleanup: bool,
    /// Expand a schedule whose time already passed today (e.g. after a restart).
    #[serde(default = "bool_true")]
    pub catch_up_missed: bool,
    /// Run a dispatch pass right after a sweep that found missed work.
    #[serde(default = "bool_true")]
    pub dispatch_missed_immediately: bool,
}

fn bool_true() -> bool { true }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_minutes() -> u32 { 5 }
fn default_grace_period_minutes() -> u32 { 30 }
fn default_stuck_threshold_minutes() -> u32 { 60 }
fn default_tick_interval_secs() -> u64 { 60 }
fn default_sweep_interval_secs() -> u64 { 300 }
fn default_max_workers() -> usize { 4 }
fn default_retention_days() -> u32 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            retry_delay_minutes: default_retry_delay_minutes(),
            grace_period_minutes: default_grace_period_minutes(),
            stuck_threshold_minutes: default_stuck_threshold_minutes(),
            tick_interval_secs: default_tick_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_workers: default_max_workers(),
            per_type_limits: BTreeMap::new(),
            retention_days: default_retention_days(),
            auto_cleanup: true,
            catch_up_missed: true,
            dispatch_missed_immediately: true,
        }
    }
}

impl SchedulerConfig {
    /// Reject values that would stall the loops or the worker pool.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(FinClawError::Config("tick_interval_secs must be > 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(FinClawError::Config("sweep_interval_secs must be > 0".into()));
        }
        if self.max_workers == 0 {
            return Err(FinClawError::Config("max_workers must be > 0".into()));
        }
        if self.grace_period_minutes == 0 {
            return Err(FinClawError::Config("grace_period_minutes must be > 0".into()));
        }
        if self.stuck_threshold_minutes == 0 {
            return Err(FinClawError::Config("stuck_threshold_minutes must be > 0".into()));
        }
        if let Some((kind, _)) = self.per_type_limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(FinClawError::Config(format!(
                "per_type_limits.{kind} must be > 0"
            )));
        }
        Ok(())
    }
}

/// Gateway (local dashboard API) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3917 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// A recurring schedule as written in configuration. Validated by the
/// scheduler's registry before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub scheduler_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub entity_name: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Local time of day, `HH:MM`.
    #[serde(alias = "time")]
    pub time_of_day: String,
}

/// HTTP bridge executor registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorEntry {
    pub scheduler_type: String,
    /// Host endpoint that runs the task and answers 2xx on success.
    pub url: String,
    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_executor_timeout_secs() -> u64 { 300 }
