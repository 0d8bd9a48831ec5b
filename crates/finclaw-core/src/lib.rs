//! # FinClaw Core
//!
//! Configuration and error types shared by the scheduler engine, the
//! gateway and the `finclaw` binary.

pub mod config;
pub mod error;

pub use config::{ExecutorEntry, FinClawConfig, GatewayConfig, ScheduleEntry, SchedulerConfig};
pub use error::{FinClawError, Result};
