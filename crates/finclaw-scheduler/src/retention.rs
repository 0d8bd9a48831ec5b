//! Retention: bounds ledger growth.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use finclaw_core::error::Result;

use crate::ledger::IntentLedger;
use crate::time::local_date;

#[derive(Debug, Clone, Serialize)]
pub struct RetentionReport {
    /// Rows dated strictly before this were eligible.
    pub cutoff: NaiveDate,
    pub deleted: usize,
    /// Old rows kept because they are still running.
    pub skipped_running: usize,
}

pub struct RetentionManager {
    ledger: Arc<IntentLedger>,
}

impl RetentionManager {
    pub fn new(ledger: Arc<IntentLedger>) -> Self {
        Self { ledger }
    }

    /// First date that is kept for a given horizon.
    pub fn cutoff_for(retention_days: u32, now: DateTime<Utc>) -> NaiveDate {
        let today = local_date(now);
        today
            .checked_sub_days(Days::new(u64::from(retention_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Delete intents dated before `today − retention_days`. Running rows are
    /// never deleted, whatever their age.
    pub fn cleanup_older_than(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport> {
        let cutoff = Self::cutoff_for(retention_days, now);
        let skipped_running = self.ledger.count_running_before(cutoff)?;
        if skipped_running > 0 {
            tracing::warn!(
                "⚠️ Retention kept {skipped_running} running intent(s) dated before {cutoff}"
            );
        }
        let deleted = self.ledger.delete_older_than(cutoff)?;
        if deleted > 0 {
            tracing::info!("🧹 Retention removed {deleted} intent(s) dated before {cutoff}");
        }
        Ok(RetentionReport {
            cutoff,
            deleted,
            skipped_running,
        })
    }
}
