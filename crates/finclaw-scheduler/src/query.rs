//! Read-only query and aggregation over the ledger, for dashboards.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use finclaw_core::error::Result;

use crate::intent::{IntentFilter, IntentPage, IntentStatus, Pagination};
use crate::ledger::IntentLedger;
use crate::schedule::{ScheduleDefinition, ScheduleRegistry};

/// Intent counts for the dashboard header.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_scheduler_type: BTreeMap<String, usize>,
    /// scheduler type → status → count
    pub by_type_and_status: BTreeMap<String, BTreeMap<String, usize>>,
}

pub struct QueryService {
    ledger: Arc<IntentLedger>,
    schedules: Arc<dyn ScheduleRegistry>,
}

impl QueryService {
    pub fn new(ledger: Arc<IntentLedger>, schedules: Arc<dyn ScheduleRegistry>) -> Self {
        Self { ledger, schedules }
    }

    pub fn get_intents(&self, filter: &IntentFilter, page: Pagination) -> Result<IntentPage> {
        self.ledger.query(filter, page)
    }

    pub fn summary(&self) -> Result<LedgerSummary> {
        let mut summary = LedgerSummary::default();
        // Every status shows up, zero or not.
        for status in IntentStatus::ALL {
            summary.by_status.insert(status.as_str().to_string(), 0);
        }
        for (kind, status, count) in self.ledger.count_by_status_and_type()? {
            summary.total += count;
            *summary.by_status.entry(status.as_str().to_string()).or_default() += count;
            *summary.by_scheduler_type.entry(kind.clone()).or_default() += count;
            *summary
                .by_type_and_status
                .entry(kind)
                .or_default()
                .entry(status.as_str().to_string())
                .or_default() += count;
        }
        Ok(summary)
    }

    pub fn list_schedules(&self, scheduler_type: Option<&str>) -> Result<Vec<ScheduleDefinition>> {
        self.schedules.list_enabled_schedules(scheduler_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{CreateOutcome, NewIntent};
    use crate::schedule::StaticScheduleRegistry;
    use chrono::{DateTime, Duration, NaiveDate, Utc};

    fn seed(ledger: &IntentLedger, kind: &str, task: &str, day: u32) -> String {
        let start: DateTime<Utc> = DateTime::parse_from_rfc3339(&format!("2026-03-{day:02}T09:00:00Z"))
            .unwrap()
            .with_timezone(&Utc);
        let new = NewIntent {
            scheduler_type: kind.into(),
            task_id: task.into(),
            task_name: task.into(),
            intended_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            intended_time: "09:00".into(),
            execution_window_start: start,
            execution_window_end: start + Duration::minutes(30),
        };
        match ledger.create_intent(&new, start).unwrap() {
            CreateOutcome::Created(intent) => intent.id,
            CreateOutcome::Conflict { existing_id } => existing_id,
        }
    }

    #[test]
    fn test_summary_counts() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let a = seed(&ledger, "finance-sync", "bank-a", 1);
        seed(&ledger, "finance-sync", "bank-b", 1);
        let c = seed(&ledger, "content-post", "post-1", 1);
        let now = Utc::now();
        assert!(ledger.claim(&a, now).unwrap());
        assert!(ledger.mark_completed(&a, now).unwrap());
        assert!(ledger.cancel(&c, now).unwrap());

        let service = QueryService::new(ledger, Arc::new(StaticScheduleRegistry::default()));
        let summary = service.summary().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_status["completed"], 1);
        assert_eq!(summary.by_status["pending"], 1);
        assert_eq!(summary.by_status["cancelled"], 1);
        assert_eq!(summary.by_status["running"], 0);
        assert_eq!(summary.by_scheduler_type["finance-sync"], 2);
        assert_eq!(summary.by_type_and_status["content-post"]["cancelled"], 1);
    }

    #[test]
    fn test_get_intents_paginates_per_type() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        for day in 1..=9 {
            seed(&ledger, "container-job", "nightly", day);
        }
        seed(&ledger, "finance-sync", "bank-a", 1);
        let service = QueryService::new(ledger, Arc::new(StaticScheduleRegistry::default()));

        let filter = IntentFilter {
            scheduler_type: Some("container-job".into()),
            ..IntentFilter::default()
        };
        let first = service.get_intents(&filter, Pagination::new(4, 0)).unwrap();
        assert_eq!(first.total, 9);
        assert_eq!(first.intents.len(), 4);
        assert_eq!(first.intents[0].intended_date.to_string(), "2026-03-09");

        let last = service.get_intents(&filter, Pagination::new(4, 8)).unwrap();
        assert_eq!(last.intents.len(), 1);
        assert_eq!(last.intents[0].intended_date.to_string(), "2026-03-01");
    }
}
