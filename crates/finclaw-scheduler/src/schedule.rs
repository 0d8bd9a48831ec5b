//! Schedule registry: recurring per-entity schedule definitions.
//!
//! Schedules are owned by external configuration; the engine only reads
//! them when expanding the day's intents.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use finclaw_core::config::ScheduleEntry;
use finclaw_core::error::{FinClawError, Result};

use crate::ledger::IntentLedger;
use crate::time::{format_time_of_day, parse_time_of_day};

/// Well-known scheduler types. Any other string is accepted and resolved
/// through the executor registry.
pub mod kinds {
    pub const FINANCE_SYNC: &str = "finance-sync";
    pub const CONTAINER_JOB: &str = "container-job";
    pub const BROWSER_REPLAY: &str = "browser-replay";
    pub const CONTENT_POST: &str = "content-post";
}

/// A validated daily schedule for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub scheduler_type: String,
    pub entity_id: String,
    pub entity_name: String,
    pub enabled: bool,
    pub time_of_day: NaiveTime,
}

impl ScheduleDefinition {
    /// Validate a raw configuration entry.
    pub fn from_entry(entry: &ScheduleEntry) -> Result<Self> {
        if entry.scheduler_type.trim().is_empty() {
            return Err(FinClawError::Config(format!(
                "schedule '{}' has an empty scheduler_type",
                entry.entity_id
            )));
        }
        if entry.entity_id.trim().is_empty() {
            return Err(FinClawError::Config(format!(
                "{} schedule has an empty entity_id",
                entry.scheduler_type
            )));
        }
        let time_of_day = parse_time_of_day(&entry.time_of_day).map_err(|e| {
            FinClawError::Config(format!(
                "schedule {}/{}: {e}",
                entry.scheduler_type, entry.entity_id
            ))
        })?;
        let entity_name = if entry.entity_name.trim().is_empty() {
            entry.entity_id.clone()
        } else {
            entry.entity_name.clone()
        };
        Ok(Self {
            scheduler_type: entry.scheduler_type.clone(),
            entity_id: entry.entity_id.clone(),
            entity_name,
            enabled: entry.enabled,
            time_of_day,
        })
    }

    /// Back to the raw configuration form.
    pub fn to_entry(&self) -> ScheduleEntry {
        ScheduleEntry {
            scheduler_type: self.scheduler_type.clone(),
            entity_id: self.entity_id.clone(),
            entity_name: self.entity_name.clone(),
            enabled: self.enabled,
            time_of_day: format_time_of_day(self.time_of_day),
        }
    }
}

/// Validate entries, logging and skipping the bad ones.
pub fn definitions_from_entries(entries: &[ScheduleEntry]) -> Vec<ScheduleDefinition> {
    entries
        .iter()
        .filter_map(|entry| match ScheduleDefinition::from_entry(entry) {
            Ok(def) => Some(def),
            Err(e) => {
                tracing::warn!("⚠️ Skipping schedule: {e}");
                None
            }
        })
        .collect()
}

/// Read accessor over externally managed schedules.
pub trait ScheduleRegistry: Send + Sync {
    /// Enabled schedules, optionally restricted to one scheduler type.
    /// Unknown types yield an empty list.
    fn list_enabled_schedules(&self, scheduler_type: Option<&str>)
    -> Result<Vec<ScheduleDefinition>>;
}

/// Registry over a fixed list, typically the `[[schedules]]` config section.
#[derive(Debug, Clone, Default)]
pub struct StaticScheduleRegistry {
    schedules: Vec<ScheduleDefinition>,
}

impl StaticScheduleRegistry {
    pub fn new(schedules: Vec<ScheduleDefinition>) -> Self {
        Self { schedules }
    }

    pub fn from_entries(entries: &[ScheduleEntry]) -> Self {
        Self::new(definitions_from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}

impl ScheduleRegistry for StaticScheduleRegistry {
    fn list_enabled_schedules(
        &self,
        scheduler_type: Option<&str>,
    ) -> Result<Vec<ScheduleDefinition>> {
        Ok(self
            .schedules
            .iter()
            .filter(|s| s.enabled)
            .filter(|s| scheduler_type.is_none_or(|t| s.scheduler_type == t))
            .cloned()
            .collect())
    }
}

/// The ledger's `schedules` table, kept in sync by the configuration writer.
impl ScheduleRegistry for IntentLedger {
    fn list_enabled_schedules(
        &self,
        scheduler_type: Option<&str>,
    ) -> Result<Vec<ScheduleDefinition>> {
        let entries = self.list_schedules(scheduler_type)?;
        Ok(definitions_from_entries(&entries)
            .into_iter()
            .filter(|s| s.enabled)
            .collect())
    }
}
