//! Recovery sweeper: repairs intents whose outcome is missing.
//!
//! Runs on its own timer, independent of the coordinator:
//! - **stuck**: running longer than `stuck_threshold_minutes` → failed
//!   (`"recovered: stuck …"`), which makes it retryable under normal rules;
//! - **missed**: window elapsed while pending or failed with budget left →
//!   failed rows are reopened, pending rows are left for the coordinator;
//! - exhausted rows stay failed and are only reported.
//!
//! The missed set is taken before stuck rows are failed, so a stuck intent
//! goes `running → failed` in one pass and `failed → pending` in the next.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use finclaw_core::config::SchedulerConfig;
use finclaw_core::error::Result;

use crate::intent::{ExecutionIntent, IntentStatus};
use crate::ledger::IntentLedger;
use crate::time::local_date;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Stuck intents moved to failed.
    pub recovered_stuck: Vec<String>,
    /// Missed failed intents reopened to pending.
    pub reopened: Vec<String>,
    /// Missed pending intents left for the coordinator.
    pub missed_pending: Vec<String>,
    /// Failed intents out of retries; need an operator.
    pub exhausted: Vec<String>,
}

impl SweepReport {
    /// Work the coordinator can pick up right away.
    pub fn found_missed(&self) -> bool {
        !self.reopened.is_empty() || !self.missed_pending.is_empty()
    }
}

/// An intent as shown on the diagnostics page.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDiagnostic {
    #[serde(flatten)]
    pub intent: ExecutionIntent,
    pub window_passed: bool,
    /// Automatic retry is still possible.
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub current_time: DateTime<Utc>,
    pub today_tasks: Vec<TaskDiagnostic>,
    pub missed_tasks: Vec<TaskDiagnostic>,
    pub stuck_tasks: Vec<TaskDiagnostic>,
    pub total_intents: usize,
}

pub struct RecoverySweeper {
    ledger: Arc<IntentLedger>,
}

impl RecoverySweeper {
    pub fn new(ledger: Arc<IntentLedger>) -> Self {
        Self { ledger }
    }

    pub fn sweep(&self, settings: &SchedulerConfig, now: DateTime<Utc>) -> Result<SweepReport> {
        let threshold = Duration::minutes(i64::from(settings.stuck_threshold_minutes));
        let mut report = SweepReport::default();

        let missed = self.missed_candidates(now)?;

        for intent in self.ledger.list_by_status(IntentStatus::Running)? {
            if !intent.is_stuck(now, threshold) {
                continue;
            }
            let message = format!(
                "recovered: stuck in running for more than {} min",
                settings.stuck_threshold_minutes
            );
            if self
                .ledger
                .fail_attempt(&intent.id, intent.retry_count, &message, now)?
            {
                tracing::warn!(
                    "🩺 Stuck intent {}/{} ({}) marked failed",
                    intent.scheduler_type,
                    intent.task_id,
                    intent.id
                );
                report.recovered_stuck.push(intent.id);
            }
        }

        for intent in missed {
            match intent.status {
                IntentStatus::Pending => report.missed_pending.push(intent.id),
                IntentStatus::Failed if intent.can_retry(settings.max_retries) => {
                    if self
                        .ledger
                        .reopen_for_retry(&intent.id, settings.max_retries, now)?
                    {
                        tracing::info!(
                            "🔁 Missed intent {}/{} ({}) reopened",
                            intent.scheduler_type,
                            intent.task_id,
                            intent.id
                        );
                        report.reopened.push(intent.id);
                    }
                }
                IntentStatus::Failed => report.exhausted.push(intent.id),
                _ => {}
            }
        }

        if !report.exhausted.is_empty() {
            tracing::warn!(
                "⛔ {} intent(s) out of retries, waiting for an operator",
                report.exhausted.len()
            );
        }
        if !report.recovered_stuck.is_empty() || !report.reopened.is_empty() {
            tracing::info!(
                "🩺 Sweep: {} stuck recovered, {} reopened, {} missed pending",
                report.recovered_stuck.len(),
                report.reopened.len(),
                report.missed_pending.len()
            );
        }
        Ok(report)
    }

    /// Read-only snapshot for dashboards. Touches nothing.
    pub fn diagnostics(&self, settings: &SchedulerConfig, now: DateTime<Utc>) -> Result<Diagnostics> {
        let threshold = Duration::minutes(i64::from(settings.stuck_threshold_minutes));
        let describe = |intent: ExecutionIntent| {
            let window_passed = intent.window_passed(now);
            let retryable = match intent.status {
                IntentStatus::Pending => true,
                IntentStatus::Failed => intent.can_retry(settings.max_retries),
                _ => false,
            };
            TaskDiagnostic {
                intent,
                window_passed,
                retryable,
            }
        };

        let today_tasks = self
            .ledger
            .list_for_date(local_date(now))?
            .into_iter()
            .map(describe)
            .collect();
        let missed_tasks = self
            .missed_candidates(now)?
            .into_iter()
            .map(describe)
            .collect();
        let stuck_tasks = self
            .ledger
            .list_by_status(IntentStatus::Running)?
            .into_iter()
            .filter(|i| i.is_stuck(now, threshold))
            .map(describe)
            .collect();

        Ok(Diagnostics {
            current_time: now,
            today_tasks,
            missed_tasks,
            stuck_tasks,
            total_intents: self.ledger.count()?,
        })
    }

    /// Pending or failed intents whose window has closed.
    fn missed_candidates(&self, now: DateTime<Utc>) -> Result<Vec<ExecutionIntent>> {
        let mut missed = Vec::new();
        for status in [IntentStatus::Pending, IntentStatus::Failed] {
            missed.extend(
                self.ledger
                    .list_by_status(status)?
                    .into_iter()
                    .filter(|i| i.window_passed(now)),
            );
        }
        Ok(missed)
    }
}
