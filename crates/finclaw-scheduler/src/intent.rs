//! Execution intents: the unit of work tracked by the ledger.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle state of an intent.
///
/// ```text
/// pending --claim--> running --success--> completed
/// running --failure--> failed --retry--> pending
/// pending|running|failed --cancel--> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl IntentStatus {
    pub const ALL: [IntentStatus; 5] = [
        IntentStatus::Pending,
        IntentStatus::Running,
        IntentStatus::Completed,
        IntentStatus::Failed,
        IntentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Running => "running",
            IntentStatus::Completed => "completed",
            IntentStatus::Failed => "failed",
            IntentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "running" => Ok(IntentStatus::Running),
            "completed" => Ok(IntentStatus::Completed),
            "failed" => Ok(IntentStatus::Failed),
            "cancelled" => Ok(IntentStatus::Cancelled),
            other => Err(format!("unknown intent status '{other}'")),
        }
    }
}

/// One intended occurrence of a scheduled task on a specific date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionIntent {
    pub id: String,
    pub scheduler_type: String,
    pub task_id: String,
    pub task_name: String,
    pub intended_date: NaiveDate,
    /// Local `HH:MM` the schedule asked for.
    pub intended_time: String,
    pub execution_window_start: DateTime<Utc>,
    pub execution_window_end: DateTime<Utc>,
    pub status: IntentStatus,
    /// Set when a claimant moves the intent to running.
    pub actual_execution_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last failure reason. Never empty once set.
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionIntent {
    /// The on-time window for this occurrence has elapsed.
    pub fn window_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.execution_window_end
    }

    /// Running for longer than `threshold` since the claim.
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == IntentStatus::Running
            && self
                .actual_execution_time
                .is_some_and(|started| now - started > threshold)
    }

    /// Retry budget left under `max_retries`.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }
}

/// Input for `IntentLedger::create_intent`.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub scheduler_type: String,
    pub task_id: String,
    pub task_name: String,
    pub intended_date: NaiveDate,
    pub intended_time: String,
    pub execution_window_start: DateTime<Utc>,
    pub execution_window_end: DateTime<Utc>,
}

/// Result of an idempotent create.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(ExecutionIntent),
    /// A non-cancelled intent already holds the idempotency key.
    Conflict { existing_id: String },
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Ledger query filter. All fields are optional and combined with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentFilter {
    #[serde(default)]
    pub scheduler_type: Option<String>,
    #[serde(default)]
    pub status: Option<IntentStatus>,
    #[serde(default)]
    pub task_id: Option<String>,
    /// Inclusive lower bound on `intended_date`.
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `intended_date`.
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// Limit/offset pagination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            offset,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, 0)
    }
}

/// One page of query results plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPage {
    pub intents: Vec<ExecutionIntent>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        for status in IntentStatus::ALL {
            assert_eq!(status.as_str().parse::<IntentStatus>().unwrap(), status);
            assert_eq!(status.to_string(), status.as_str());
        }
        assert!("archived".parse::<IntentStatus>().is_err());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&IntentStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn test_pagination_clamps_limit() {
        assert_eq!(Pagination::new(0, 0).limit, 1);
        assert_eq!(Pagination::new(10_000, 5).limit, MAX_PAGE_SIZE);
        assert_eq!(Pagination::default().limit, DEFAULT_PAGE_SIZE);
    }
}
