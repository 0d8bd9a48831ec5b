//! Scheduler service: the procedure-call surface the dashboard consumes.
//!
//! Every call takes and returns serde types and never fails at the Rust
//! level: errors are reported as `{ "success": false, "error": "…" }`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use finclaw_core::config::SchedulerConfig;
use finclaw_core::error::{FinClawError, Result};

use crate::coordinator::TickReport;
use crate::engine::{EngineStatus, SchedulerEngine};
use crate::intent::{
    DEFAULT_PAGE_SIZE, ExecutionIntent, IntentFilter, IntentStatus, Pagination,
};
use crate::query::LedgerSummary;
use crate::recovery::Diagnostics;
use crate::schedule::ScheduleDefinition;

// ─── Requests ──────────────────────────────────────

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetIntentsRequest {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub scheduler_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

impl Default for GetIntentsRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            scheduler_type: None,
            status: None,
            task_id: None,
            date_from: None,
            date_to: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTaskRequest {
    pub scheduler_type: String,
    pub task_id: String,
    pub intended_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryTaskRequest {
    pub intent_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupRequest {
    /// Falls back to the configured `retention_days`.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default, alias = "retry_count", alias = "retryCount")]
    pub max_retries: Option<u32>,
    #[serde(default, alias = "retryDelayMinutes")]
    pub retry_delay_minutes: Option<u32>,
    #[serde(default, alias = "gracePeriodMinutes")]
    pub grace_period_minutes: Option<u32>,
    #[serde(default, alias = "stuckThresholdMinutes")]
    pub stuck_threshold_minutes: Option<u32>,
    #[serde(default)]
    pub tick_interval_secs: Option<u64>,
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub per_type_limits: Option<BTreeMap<String, usize>>,
    #[serde(default, alias = "retentionDays")]
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub auto_cleanup: Option<bool>,
    #[serde(default)]
    pub catch_up_missed: Option<bool>,
    #[serde(default)]
    pub dispatch_missed_immediately: Option<bool>,
}

impl SettingsUpdate {
    pub fn apply(self, mut settings: SchedulerConfig) -> SchedulerConfig {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field {
                    settings.$field = value;
                })*
            };
        }
        merge!(
            enabled,
            max_retries,
            retry_delay_minutes,
            grace_period_minutes,
            stuck_threshold_minutes,
            tick_interval_secs,
            sweep_interval_secs,
            max_workers,
            per_type_limits,
            retention_days,
            auto_cleanup,
            catch_up_missed,
            dispatch_missed_immediately
        );
        settings
    }
}

// ─── Responses ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentsResponse {
    pub success: bool,
    pub intents: Vec<ExecutionIntent>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted_count: usize,
    pub skipped_running: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub diagnostics: Option<Diagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TickReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub settings: SchedulerConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: Option<LedgerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulesResponse {
    pub success: bool,
    pub schedules: Vec<ScheduleDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ─── Service ──────────────────────────────────────

#[derive(Clone)]
pub struct SchedulerService {
    engine: Arc<SchedulerEngine>,
}

impl SchedulerService {
    pub fn new(engine: Arc<SchedulerEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<SchedulerEngine> {
        &self.engine
    }

    pub fn get_intents(&self, req: GetIntentsRequest) -> IntentsResponse {
        let page = Pagination::new(req.limit, req.offset);
        let result = req
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<IntentStatus>().map_err(FinClawError::Other))
            .transpose()
            .and_then(|status| {
                let filter = IntentFilter {
                    scheduler_type: req.scheduler_type.filter(|s| !s.is_empty()),
                    status,
                    task_id: req.task_id.filter(|s| !s.is_empty()),
                    date_from: req.date_from,
                    date_to: req.date_to,
                };
                self.engine.query().get_intents(&filter, page)
            });

        match result {
            Ok(found) => IntentsResponse {
                success: true,
                intents: found.intents,
                total: found.total,
                limit: page.limit,
                offset: page.offset,
                error: None,
            },
            Err(e) => IntentsResponse {
                success: false,
                intents: Vec::new(),
                total: 0,
                limit: page.limit,
                offset: page.offset,
                error: Some(e.to_string()),
            },
        }
    }

    /// Cancel the live intent for one task on one day.
    pub fn cancel_task(&self, req: CancelTaskRequest) -> ActionResponse {
        ActionResponse::from_result(self.try_cancel(&req))
    }

    fn try_cancel(&self, req: &CancelTaskRequest) -> Result<()> {
        let ledger = self.engine.ledger();
        let intent = ledger
            .find_active_by_key(&req.scheduler_type, &req.task_id, req.intended_date)?
            .ok_or_else(|| {
                FinClawError::NotFound(format!(
                    "no active intent for {}/{} on {}",
                    req.scheduler_type, req.task_id, req.intended_date
                ))
            })?;
        if ledger.cancel(&intent.id, self.engine.now())? {
            Ok(())
        } else {
            Err(FinClawError::InvalidTransition(format!(
                "intent {} is {} and cannot be cancelled",
                intent.id, intent.status
            )))
        }
    }

    /// Operator retry of a failed intent, even when retries are exhausted.
    pub fn retry_task(&self, req: RetryTaskRequest) -> ActionResponse {
        ActionResponse::from_result(self.try_retry(&req))
    }

    fn try_retry(&self, req: &RetryTaskRequest) -> Result<()> {
        let ledger = self.engine.ledger();
        let intent = ledger
            .get(&req.intent_id)?
            .ok_or_else(|| FinClawError::NotFound(format!("intent {}", req.intent_id)))?;
        if intent.status != IntentStatus::Failed {
            return Err(FinClawError::InvalidTransition(format!(
                "intent {} is {}, only failed intents can be retried",
                intent.id, intent.status
            )));
        }
        if ledger.force_reopen(&intent.id, self.engine.now())? {
            Ok(())
        } else {
            Err(FinClawError::InvalidTransition(format!(
                "intent {} changed state before it could be retried",
                intent.id
            )))
        }
    }

    pub fn cleanup_older_than(&self, req: CleanupRequest) -> CleanupResponse {
        let days = req
            .retention_days
            .unwrap_or_else(|| self.engine.settings().retention_days);
        match self.engine.cleanup_older_than(days) {
            Ok(report) => CleanupResponse {
                success: true,
                deleted_count: report.deleted,
                skipped_running: report.skipped_running,
                cutoff: Some(report.cutoff),
                error: None,
            },
            Err(e) => CleanupResponse {
                success: false,
                deleted_count: 0,
                skipped_running: 0,
                cutoff: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn get_diagnostics(&self) -> DiagnosticsResponse {
        match self.engine.diagnostics() {
            Ok(diagnostics) => DiagnosticsResponse {
                success: true,
                diagnostics: Some(diagnostics),
                error: None,
            },
            Err(e) => DiagnosticsResponse {
                success: false,
                diagnostics: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn start_scheduler(&self) -> ActionResponse {
        if !self.engine.start() {
            tracing::debug!("Scheduler already running");
        }
        ActionResponse::from_result(Ok(()))
    }

    pub fn stop_scheduler(&self) -> ActionResponse {
        if !self.engine.stop() {
            tracing::debug!("Scheduler already stopped");
        }
        ActionResponse::from_result(Ok(()))
    }

    /// Manual trigger of one coordinator pass.
    pub fn sync_now(&self) -> SyncResponse {
        match self.engine.sync_now() {
            Ok(report) => SyncResponse {
                success: true,
                report: Some(report),
                error: None,
            },
            Err(e) => SyncResponse {
                success: false,
                report: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn get_settings(&self) -> SettingsResponse {
        SettingsResponse {
            success: true,
            settings: self.engine.settings(),
            error: None,
        }
    }

    pub fn set_settings(&self, update: SettingsUpdate) -> SettingsResponse {
        let merged = update.apply(self.engine.settings());
        match self.engine.set_settings(merged) {
            Ok(settings) => SettingsResponse {
                success: true,
                settings,
                error: None,
            },
            Err(e) => SettingsResponse {
                success: false,
                settings: self.engine.settings(),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn get_summary(&self) -> SummaryResponse {
        match self.engine.query().summary() {
            Ok(summary) => SummaryResponse {
                success: true,
                summary: Some(summary),
                error: None,
            },
            Err(e) => SummaryResponse {
                success: false,
                summary: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn list_schedules(&self, scheduler_type: Option<&str>) -> SchedulesResponse {
        match self.engine.query().list_schedules(scheduler_type) {
            Ok(schedules) => SchedulesResponse {
                success: true,
                schedules,
                error: None,
            },
            Err(e) => SchedulesResponse {
                success: false,
                schedules: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.engine.status()
    }
}
