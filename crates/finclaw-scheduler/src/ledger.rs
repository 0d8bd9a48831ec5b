//! Intent ledger: SQLite-backed store of execution intents.
//!
//! Sole source of truth for "did this run, is it running, will it run".
//! Every state transition is one conditional `UPDATE … WHERE status = …`
//! on a single row, so the coordinator and the sweeper can share the ledger
//! without any other lock.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use finclaw_core::config::{ScheduleEntry, SchedulerConfig};
use finclaw_core::error::{FinClawError, Result};

use crate::intent::{
    CreateOutcome, ExecutionIntent, IntentFilter, IntentPage, IntentStatus, NewIntent, Pagination,
};

/// Shared SELECT column list for intent queries.
const INTENT_SELECT: &str = "SELECT id, scheduler_type, task_id, task_name, intended_date, intended_time, \
     window_start, window_end, status, actual_execution_time, completed_at, error_message, \
     retry_count, failed_at, cancelled_at, created_at, updated_at FROM execution_intents";

/// Fixed-width RFC 3339 so timestamps compare correctly as text.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, v)).transpose()
}

/// Map a database row to an ExecutionIntent.
fn row_to_intent(row: &rusqlite::Row) -> rusqlite::Result<ExecutionIntent> {
    let intended_date: String = row.get(4)?;
    let status: String = row.get(8)?;
    Ok(ExecutionIntent {
        id: row.get(0)?,
        scheduler_type: row.get(1)?,
        task_id: row.get(2)?,
        task_name: row.get(3)?,
        intended_date: NaiveDate::parse_from_str(&intended_date, "%Y-%m-%d")
            .map_err(|e| conversion_error(4, e))?,
        intended_time: row.get(5)?,
        execution_window_start: parse_ts(6, row.get(6)?)?,
        execution_window_end: parse_ts(7, row.get(7)?)?,
        status: status.parse::<IntentStatus>().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(8, Type::Text, e.into())
        })?,
        actual_execution_time: parse_opt_ts(9, row.get(9)?)?,
        completed_at: parse_opt_ts(10, row.get(10)?)?,
        error_message: row.get(11)?,
        retry_count: row.get(12)?,
        failed_at: parse_opt_ts(13, row.get(13)?)?,
        cancelled_at: parse_opt_ts(14, row.get(14)?)?,
        created_at: parse_ts(15, row.get(15)?)?,
        updated_at: parse_ts(16, row.get(16)?)?,
    })
}

/// Durable, queryable storage for execution intents, schedules and settings.
pub struct IntentLedger {
    conn: Mutex<Connection>,
}

impl IntentLedger {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| FinClawError::Database(format!("DB open error: {e}")))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| FinClawError::Database(format!("DB pragma error: {e}")))?;

        Self::with_connection(conn)
    }

    /// In-memory ledger (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FinClawError::Database(format!("DB open error: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FinClawError::Database(format!("ledger lock poisoned: {e}")))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS execution_intents (
                id TEXT PRIMARY KEY,
                scheduler_type TEXT NOT NULL,
                task_id TEXT NOT NULL,
                task_name TEXT NOT NULL,
                intended_date TEXT NOT NULL,     -- YYYY-MM-DD (local)
                intended_time TEXT NOT NULL,     -- HH:MM (local)
                window_start TEXT NOT NULL,
                window_end TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                actual_execution_time TEXT,
                completed_at TEXT,
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                failed_at TEXT,
                cancelled_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- One live intent per task per day; cancelled rows free the key.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_intents_idempotency
                ON execution_intents (scheduler_type, task_id, intended_date)
                WHERE status != 'cancelled';
            CREATE INDEX IF NOT EXISTS idx_intents_status ON execution_intents (status);
            CREATE INDEX IF NOT EXISTS idx_intents_date ON execution_intents (intended_date);

            CREATE TABLE IF NOT EXISTS schedules (
                scheduler_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                entity_name TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1,
                time_of_day TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (scheduler_type, entity_id)
            );

            CREATE TABLE IF NOT EXISTS scheduler_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload TEXT NOT NULL,           -- JSON SchedulerConfig
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| FinClawError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    // ─── Intents ──────────────────────────────────────

    /// Insert a pending intent, or report the live intent already holding
    /// `(scheduler_type, task_id, intended_date)`.
    pub fn create_intent(&self, new: &NewIntent, now: DateTime<Utc>) -> Result<CreateOutcome> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO execution_intents
             (id, scheduler_type, task_id, task_name, intended_date, intended_time,
              window_start, window_end, status, retry_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, ?9, ?9)",
            params![
                id,
                new.scheduler_type,
                new.task_id,
                new.task_name,
                fmt_date(new.intended_date),
                new.intended_time,
                fmt_ts(new.execution_window_start),
                fmt_ts(new.execution_window_end),
                fmt_ts(now),
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::info!(
                    "📅 Intent created: {}/{} for {} ({})",
                    new.scheduler_type,
                    new.task_id,
                    new.intended_date,
                    id
                );
                Ok(CreateOutcome::Created(ExecutionIntent {
                    id,
                    scheduler_type: new.scheduler_type.clone(),
                    task_id: new.task_id.clone(),
                    task_name: new.task_name.clone(),
                    intended_date: new.intended_date,
                    intended_time: new.intended_time.clone(),
                    execution_window_start: new.execution_window_start,
                    execution_window_end: new.execution_window_end,
                    status: IntentStatus::Pending,
                    actual_execution_time: None,
                    completed_at: None,
                    error_message: None,
                    retry_count: 0,
                    failed_at: None,
                    cancelled_at: None,
                    created_at: now,
                    updated_at: now,
                }))
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                let existing_id: String = conn.query_row(
                    "SELECT id FROM execution_intents
                     WHERE scheduler_type = ?1 AND task_id = ?2 AND intended_date = ?3
                       AND status != 'cancelled'",
                    params![new.scheduler_type, new.task_id, fmt_date(new.intended_date)],
                    |row| row.get(0),
                )?;
                tracing::debug!(
                    "Intent already exists for {}/{} on {}: {}",
                    new.scheduler_type,
                    new.task_id,
                    new.intended_date,
                    existing_id
                );
                Ok(CreateOutcome::Conflict { existing_id })
            }
            Err(e) => Err(FinClawError::Database(format!("Create intent: {e}"))),
        }
    }

    /// Fetch one intent.
    pub fn get(&self, id: &str) -> Result<Option<ExecutionIntent>> {
        let conn = self.conn()?;
        let intent = conn
            .query_row(&format!("{INTENT_SELECT} WHERE id = ?1"), [id], row_to_intent)
            .optional()?;
        Ok(intent)
    }

    /// The non-cancelled intent for an idempotency key, if any.
    pub fn find_active_by_key(
        &self,
        scheduler_type: &str,
        task_id: &str,
        intended_date: NaiveDate,
    ) -> Result<Option<ExecutionIntent>> {
        let conn = self.conn()?;
        let intent = conn
            .query_row(
                &format!(
                    "{INTENT_SELECT} WHERE scheduler_type = ?1 AND task_id = ?2
                     AND intended_date = ?3 AND status != 'cancelled'"
                ),
                params![scheduler_type, task_id, fmt_date(intended_date)],
                row_to_intent,
            )
            .optional()?;
        Ok(intent)
    }

    /// True when the operator cancelled this key's intent for the day. The
    /// coordinator uses it so a cancel is not undone by the next expansion.
    pub fn is_cancelled_for_key(
        &self,
        scheduler_type: &str,
        task_id: &str,
        intended_date: NaiveDate,
    ) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM execution_intents
                 WHERE scheduler_type = ?1 AND task_id = ?2 AND intended_date = ?3
                   AND status = 'cancelled'
                 LIMIT 1",
                params![scheduler_type, task_id, fmt_date(intended_date)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Compare-and-set `pending → running`. Returns false if another claimant
    /// got there first or the intent is no longer pending.
    pub fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.claim_inner(id, None, now)
    }

    /// `claim`, but only if the row is still on `attempt` (its `retry_count`
    /// when it was listed). A row that failed and reopened in between is left
    /// for the next pass.
    pub fn claim_attempt(&self, id: &str, attempt: u32, now: DateTime<Utc>) -> Result<bool> {
        self.claim_inner(id, Some(attempt), now)
    }

    fn claim_inner(&self, id: &str, attempt: Option<u32>, now: DateTime<Utc>) -> Result<bool> {
        let ts = fmt_ts(now);
        let changed = self.conn()?.execute(
            "UPDATE execution_intents
             SET status = 'running', actual_execution_time = ?1, updated_at = ?1
             WHERE id = ?2 AND status = 'pending' AND (?3 IS NULL OR retry_count = ?3)",
            params![ts, id, attempt],
        )?;
        Ok(changed == 1)
    }

    /// `running → completed`. A no-op (logged) from any other state.
    pub fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.complete_inner(id, None, now)
    }

    /// `mark_completed` for one attempt. The result of an attempt that was
    /// already failed by the sweeper never lands on its successor.
    pub fn complete_attempt(&self, id: &str, attempt: u32, now: DateTime<Utc>) -> Result<bool> {
        self.complete_inner(id, Some(attempt), now)
    }

    fn complete_inner(&self, id: &str, attempt: Option<u32>, now: DateTime<Utc>) -> Result<bool> {
        let ts = fmt_ts(now);
        let changed = self.conn()?.execute(
            "UPDATE execution_intents
             SET status = 'completed', completed_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status = 'running' AND (?3 IS NULL OR retry_count = ?3)",
            params![ts, id, attempt],
        )?;
        if changed == 0 {
            self.log_rejected(id, "complete", attempt);
        }
        Ok(changed == 1)
    }

    /// `running → failed`, recording the reason and bumping `retry_count`.
    pub fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<bool> {
        self.fail_inner(id, None, error, now)
    }

    /// `mark_failed` for one attempt.
    pub fn fail_attempt(
        &self,
        id: &str,
        attempt: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.fail_inner(id, Some(attempt), error, now)
    }

    fn fail_inner(
        &self,
        id: &str,
        attempt: Option<u32>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let message = if error.trim().is_empty() {
            "unknown error"
        } else {
            error
        };
        let ts = fmt_ts(now);
        let changed = self.conn()?.execute(
            "UPDATE execution_intents
             SET status = 'failed', error_message = ?1, retry_count = retry_count + 1,
                 failed_at = ?2, updated_at = ?2
             WHERE id = ?3 AND status = 'running' AND (?4 IS NULL OR retry_count = ?4)",
            params![message, ts, id, attempt],
        )?;
        if changed == 0 {
            self.log_rejected(id, "fail", attempt);
        }
        Ok(changed == 1)
    }

    /// `failed → pending`, only while `retry_count < max_retries`.
    pub fn reopen_for_retry(&self, id: &str, max_retries: u32, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE execution_intents
             SET status = 'pending', updated_at = ?1
             WHERE id = ?2 AND status = 'failed' AND retry_count < ?3",
            params![fmt_ts(now), id, max_retries],
        )?;
        Ok(changed == 1)
    }

    /// Operator retry: `failed → pending` regardless of the retry budget.
    pub fn force_reopen(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE execution_intents
             SET status = 'pending', updated_at = ?1
             WHERE id = ?2 AND status = 'failed'",
            params![fmt_ts(now), id],
        )?;
        if changed == 1 {
            tracing::info!("🔁 Intent {id} manually reopened");
        }
        Ok(changed == 1)
    }

    /// Terminal cancel from pending, running or failed. A running executor
    /// is not interrupted; its late result is ignored.
    pub fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let ts = fmt_ts(now);
        let changed = self.conn()?.execute(
            "UPDATE execution_intents
             SET status = 'cancelled', cancelled_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status IN ('pending', 'running', 'failed')",
            params![ts, id],
        )?;
        if changed == 1 {
            tracing::info!("🚫 Intent {id} cancelled");
        } else {
            self.log_rejected(id, "cancel", None);
        }
        Ok(changed == 1)
    }

    fn log_rejected(&self, id: &str, action: &str, attempt: Option<u32>) {
        match self.get(id) {
            Ok(Some(intent)) => match attempt {
                Some(attempt)
                    if intent.status == IntentStatus::Running && intent.retry_count != attempt =>
                {
                    tracing::warn!(
                        "⚠️ Ignored {action} for intent {id}: result of attempt {} arrived during attempt {}",
                        attempt + 1,
                        intent.retry_count + 1
                    )
                }
                _ => tracing::warn!(
                    "⚠️ Ignored {action} for intent {id}: status is {}",
                    intent.status
                ),
            },
            Ok(None) => tracing::warn!("⚠️ Ignored {action} for unknown intent {id}"),
            Err(e) => tracing::warn!("⚠️ Ignored {action} for intent {id}: {e}"),
        }
    }

    /// Filtered, paginated listing, newest first.
    pub fn query(&self, filter: &IntentFilter, page: Pagination) -> Result<IntentPage> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(kind) = &filter.scheduler_type {
            clauses.push("scheduler_type = ?");
            values.push(Value::Text(kind.clone()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(task_id) = &filter.task_id {
            clauses.push("task_id = ?");
            values.push(Value::Text(task_id.clone()));
        }
        if let Some(from) = filter.date_from {
            clauses.push("intended_date >= ?");
            values.push(Value::Text(fmt_date(from)));
        }
        if let Some(to) = filter.date_to {
            clauses.push("intended_date <= ?");
            values.push(Value::Text(fmt_date(to)));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM execution_intents{where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(i64::try_from(page.limit).unwrap_or(i64::MAX)));
        values.push(Value::Integer(i64::try_from(page.offset).unwrap_or(i64::MAX)));
        let mut stmt = conn.prepare(&format!(
            "{INTENT_SELECT}{where_sql}
             ORDER BY intended_date DESC, intended_time DESC, created_at DESC
             LIMIT ? OFFSET ?"
        ))?;
        let intents = stmt
            .query_map(params_from_iter(values.iter()), row_to_intent)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(IntentPage {
            intents,
            total: total as usize,
        })
    }

    fn list_where(&self, where_sql: &str, values: Vec<Value>) -> Result<Vec<ExecutionIntent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{INTENT_SELECT} WHERE {where_sql}"))?;
        let intents = stmt
            .query_map(params_from_iter(values.iter()), row_to_intent)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(intents)
    }

    /// All intents in one status, oldest window first.
    pub fn list_by_status(&self, status: IntentStatus) -> Result<Vec<ExecutionIntent>> {
        self.list_where(
            "status = ? ORDER BY window_start, created_at",
            vec![Value::Text(status.as_str().to_string())],
        )
    }

    /// Pending intents whose window has opened.
    pub fn list_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<ExecutionIntent>> {
        self.list_where(
            "status = 'pending' AND window_start <= ? ORDER BY window_start, created_at",
            vec![Value::Text(fmt_ts(now))],
        )
    }

    /// Every intent for one local date.
    pub fn list_for_date(&self, date: NaiveDate) -> Result<Vec<ExecutionIntent>> {
        self.list_where(
            "intended_date = ? ORDER BY intended_time, scheduler_type, task_id",
            vec![Value::Text(fmt_date(date))],
        )
    }

    /// Raw row count.
    pub fn count(&self) -> Result<usize> {
        let total: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM execution_intents", [], |row| row.get(0))?;
        Ok(total as usize)
    }

    /// Row counts grouped by `(scheduler_type, status)`.
    pub fn count_by_status_and_type(&self) -> Result<Vec<(String, IntentStatus, usize)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT scheduler_type, status, COUNT(*) FROM execution_intents
             GROUP BY scheduler_type, status ORDER BY scheduler_type, status",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let kind: String = row.get(0)?;
                let status: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((kind, status, count))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, status, count)| match status.parse::<IntentStatus>() {
                Ok(status) => Some((kind, status, count as usize)),
                Err(e) => {
                    tracing::warn!("⚠️ Skipping unknown status in ledger: {e}");
                    None
                }
            })
            .collect())
    }

    /// Running rows dated before `cutoff` (retention never touches them).
    pub fn count_running_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM execution_intents WHERE intended_date < ?1 AND status = 'running'",
            [fmt_date(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete intents dated before `cutoff`, except running ones.
    pub fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize> {
        let deleted = self.conn()?.execute(
            "DELETE FROM execution_intents WHERE intended_date < ?1 AND status != 'running'",
            [fmt_date(cutoff)],
        )?;
        Ok(deleted)
    }

    // ─── Schedules ──────────────────────────────────────

    /// Insert or replace a schedule row. Written by external configuration.
    pub fn upsert_schedule(&self, entry: &ScheduleEntry, now: DateTime<Utc>) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO schedules
             (scheduler_type, entity_id, entity_name, enabled, time_of_day, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.scheduler_type,
                entry.entity_id,
                entry.entity_name,
                entry.enabled as i32,
                entry.time_of_day,
                fmt_ts(now),
            ],
        )?;
        Ok(())
    }

    /// Upsert every entry (config file seeding). Returns rows written.
    pub fn sync_schedules(&self, entries: &[ScheduleEntry], now: DateTime<Utc>) -> Result<usize> {
        for entry in entries {
            self.upsert_schedule(entry, now)?;
        }
        Ok(entries.len())
    }

    pub fn remove_schedule(&self, scheduler_type: &str, entity_id: &str) -> Result<bool> {
        let changed = self.conn()?.execute(
            "DELETE FROM schedules WHERE scheduler_type = ?1 AND entity_id = ?2",
            params![scheduler_type, entity_id],
        )?;
        Ok(changed == 1)
    }

    /// Raw schedule rows, enabled or not, optionally for one type.
    pub fn list_schedules(&self, scheduler_type: Option<&str>) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT scheduler_type, entity_id, entity_name, enabled, time_of_day FROM schedules
             WHERE ?1 IS NULL OR scheduler_type = ?1
             ORDER BY scheduler_type, time_of_day, entity_id",
        )?;
        let rows = stmt
            .query_map([scheduler_type], |row| {
                Ok(ScheduleEntry {
                    scheduler_type: row.get(0)?,
                    entity_id: row.get(1)?,
                    entity_name: row.get(2)?,
                    enabled: row.get::<_, i32>(3)? != 0,
                    time_of_day: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ─── Settings ──────────────────────────────────────

    /// Persisted scheduler settings, if any were saved.
    pub fn load_settings(&self) -> Result<Option<SchedulerConfig>> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM scheduler_settings WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|json| serde_json::from_str(&json).map_err(FinClawError::from))
            .transpose()
    }

    pub fn save_settings(&self, settings: &SchedulerConfig, now: DateTime<Utc>) -> Result<()> {
        let payload = serde_json::to_string(settings)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO scheduler_settings (id, payload, updated_at) VALUES (1, ?1, ?2)",
            params![payload, fmt_ts(now)],
        )?;
        Ok(())
    }
}
