//! # FinClaw Scheduler
//!
//! Scheduled task execution and recovery engine for the FinClaw automation
//! desktop: finance syncs, container jobs, browser-automation replays and
//! content posts, all driven from one durable intent ledger.
//!
//! ## Architecture
//! ```text
//! ScheduleRegistry ──► ExecutionCoordinator ──► ExecutorRegistry
//!   (daily HH:MM)        │  expand / claim          ├── finance-sync  → HttpExecutor
//!                        │  dispatch (WorkerPool)   ├── browser-replay → HttpExecutor
//!                        ▼                          └── …
//!                   IntentLedger (SQLite) ◄── RecoverySweeper (stuck / missed)
//!                        ▲                ◄── RetentionManager
//!                        └── QueryService ◄── SchedulerService ◄── gateway / CLI
//! ```
//!
//! ## Design Principles
//! - One SQLite file, WAL mode: survives restarts, no external broker
//! - Every state change is one conditional UPDATE: no cross-actor locks
//! - Executors are plug-ins resolved by scheduler type at startup
//! - Cancellation is cooperative: it stops future claims, never aborts work

pub mod bridge;
pub mod coordinator;
pub mod engine;
pub mod executor;
pub mod intent;
pub mod ledger;
pub mod pool;
pub mod query;
pub mod recovery;
pub mod retention;
pub mod schedule;
pub mod service;
pub mod time;

pub use bridge::HttpExecutor;
pub use coordinator::{ExecutionCoordinator, TickReport};
pub use engine::{EngineStatus, SchedulerEngine};
pub use executor::{ExecutorRegistry, TaskExecutor, TaskJob};
pub use intent::{
    CreateOutcome, ExecutionIntent, IntentFilter, IntentPage, IntentStatus, NewIntent, Pagination,
};
pub use ledger::IntentLedger;
pub use pool::{PoolStats, WorkerPool};
pub use query::{LedgerSummary, QueryService};
pub use recovery::{Diagnostics, RecoverySweeper, SweepReport};
pub use retention::{RetentionManager, RetentionReport};
pub use schedule::{ScheduleDefinition, ScheduleRegistry, StaticScheduleRegistry};
pub use service::SchedulerService;
pub use time::{Clock, system_clock};
