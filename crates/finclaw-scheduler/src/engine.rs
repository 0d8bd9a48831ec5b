//! Scheduler engine: owns the two periodic actors and their shared state.
//!
//! ```text
//! coordinator loop (tick_interval_secs)   sweeper loop (sweep_interval_secs)
//!   expand → retry → dispatch               stuck → missed → [dispatch]
//!          \                                   /         └── daily retention
//!           └──────────── IntentLedger ───────┘
//! ```
//!
//! The loops share nothing but the ledger; every transition there is a single
//! conditional write, so no extra locking is needed between them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use finclaw_core::config::SchedulerConfig;
use finclaw_core::error::Result;

use crate::coordinator::{ExecutionCoordinator, TickReport};
use crate::executor::ExecutorRegistry;
use crate::ledger::IntentLedger;
use crate::pool::{PoolStats, WorkerPool};
use crate::query::QueryService;
use crate::recovery::{Diagnostics, RecoverySweeper, SweepReport};
use crate::retention::{RetentionManager, RetentionReport};
use crate::schedule::ScheduleRegistry;
use crate::time::{Clock, local_date, system_clock};

/// Background loops of a started engine.
struct Running {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Activity {
    last_tick: Option<DateTime<Utc>>,
    last_sweep: Option<DateTime<Utc>>,
    last_cleanup: Option<NaiveDate>,
}

/// Snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub enabled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_sweep: Option<DateTime<Utc>>,
    pub last_cleanup: Option<NaiveDate>,
    pub executors: Vec<String>,
    pub pool: PoolStats,
}

pub struct SchedulerEngine {
    ledger: Arc<IntentLedger>,
    coordinator: ExecutionCoordinator,
    sweeper: RecoverySweeper,
    retention: RetentionManager,
    query: QueryService,
    settings: RwLock<SchedulerConfig>,
    pool: Arc<WorkerPool>,
    clock: Clock,
    running: Mutex<Option<Running>>,
    activity: Mutex<Activity>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SchedulerEngine {
    pub fn new(
        ledger: Arc<IntentLedger>,
        schedules: Arc<dyn ScheduleRegistry>,
        executors: ExecutorRegistry,
        settings: SchedulerConfig,
    ) -> Self {
        Self::with_clock(ledger, schedules, executors, settings, system_clock())
    }

    /// Same as [`SchedulerEngine::new`] with an injected clock.
    pub fn with_clock(
        ledger: Arc<IntentLedger>,
        schedules: Arc<dyn ScheduleRegistry>,
        executors: ExecutorRegistry,
        settings: SchedulerConfig,
        clock: Clock,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(settings.max_workers, &settings.per_type_limits));
        Self {
            coordinator: ExecutionCoordinator::new(
                ledger.clone(),
                schedules.clone(),
                Arc::new(executors),
                clock.clone(),
            ),
            sweeper: RecoverySweeper::new(ledger.clone()),
            retention: RetentionManager::new(ledger.clone()),
            query: QueryService::new(ledger.clone(), schedules),
            ledger,
            settings: RwLock::new(settings),
            pool,
            clock,
            running: Mutex::new(None),
            activity: Mutex::new(Activity::default()),
        }
    }

    pub fn ledger(&self) -> &Arc<IntentLedger> {
        &self.ledger
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn settings(&self) -> SchedulerConfig {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    // ─── Lifecycle ──────────────────────────────────────

    /// Spawn the coordinator and sweeper loops. Returns false if already
    /// running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = lock(&self.running);
        if running.is_some() {
            return false;
        }
        let settings = self.settings();
        let (tx, rx) = watch::channel(false);
        let handles = vec![
            tokio::spawn(coordinator_loop(self.clone(), settings.tick_interval_secs, rx.clone())),
            tokio::spawn(sweeper_loop(self.clone(), settings.sweep_interval_secs, rx)),
        ];
        *running = Some(Running {
            shutdown: tx,
            handles,
            started_at: self.now(),
        });
        tracing::info!(
            "⏰ Scheduler started (tick {}s, sweep {}s, {} workers)",
            settings.tick_interval_secs,
            settings.sweep_interval_secs,
            settings.max_workers
        );
        true
    }

    /// Signal both loops to exit. In-flight executors keep running and still
    /// report their outcome. Returns false if not running.
    pub fn stop(&self) -> bool {
        let Some(running) = lock(&self.running).take() else {
            return false;
        };
        let _ = running.shutdown.send(true);
        drop(running.handles);
        tracing::info!("⏹️ Scheduler stopping");
        true
    }

    /// Stop and wait for both loops to finish their current pass.
    pub async fn shutdown(&self) {
        let running = lock(&self.running).take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            for handle in running.handles {
                let _ = handle.await;
            }
            tracing::info!("⏹️ Scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Wait until no executor holds a worker slot.
    pub async fn wait_idle(&self) {
        self.pool().wait_idle().await;
    }

    // ─── Passes ──────────────────────────────────────

    /// One coordinator pass right now.
    pub fn sync_now(&self) -> Result<TickReport> {
        let now = self.now();
        let report = self.coordinator.tick(&self.settings(), self.pool(), now)?;
        lock(&self.activity).last_tick = Some(now);
        Ok(report)
    }

    /// One sweeper pass right now, dispatching reclaimed work immediately
    /// when `dispatch_missed_immediately` is set.
    pub fn sweep_now(&self) -> Result<SweepReport> {
        let now = self.now();
        let settings = self.settings();
        let report = self.sweeper.sweep(&settings, now)?;
        lock(&self.activity).last_sweep = Some(now);
        if report.found_missed() && settings.dispatch_missed_immediately {
            let dispatch = self.coordinator.dispatch_due(self.pool(), now)?;
            if !dispatch.dispatched.is_empty() {
                tracing::info!("🚀 Dispatched {} missed intent(s)", dispatch.dispatched.len());
            }
        }
        Ok(report)
    }

    pub fn diagnostics(&self) -> Result<Diagnostics> {
        self.sweeper.diagnostics(&self.settings(), self.now())
    }

    pub fn cleanup_older_than(&self, retention_days: u32) -> Result<RetentionReport> {
        let now = self.now();
        let report = self.retention.cleanup_older_than(retention_days, now)?;
        lock(&self.activity).last_cleanup = Some(local_date(now));
        Ok(report)
    }

    /// Daily retention from the sweeper loop.
    fn auto_cleanup(&self) -> Result<Option<RetentionReport>> {
        let settings = self.settings();
        if !settings.auto_cleanup {
            return Ok(None);
        }
        let today = local_date(self.now());
        if lock(&self.activity).last_cleanup == Some(today) {
            return Ok(None);
        }
        self.cleanup_older_than(settings.retention_days).map(Some)
    }

    // ─── Settings ──────────────────────────────────────

    /// Validate, persist and apply new settings. The pool is resized in
    /// place, so executors already in flight count against the new limits.
    /// Changed intervals restart the loops.
    pub fn set_settings(self: &Arc<Self>, settings: SchedulerConfig) -> Result<SchedulerConfig> {
        settings.validate()?;
        self.ledger.save_settings(&settings, self.now())?;

        let previous = {
            let mut current = self
                .settings
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, settings.clone())
        };

        if previous.max_workers != settings.max_workers
            || previous.per_type_limits != settings.per_type_limits
        {
            self.pool.resize(settings.max_workers, &settings.per_type_limits);
            tracing::info!("🚦 Worker pool resized to {}", settings.max_workers);
        }

        if (previous.tick_interval_secs != settings.tick_interval_secs
            || previous.sweep_interval_secs != settings.sweep_interval_secs)
            && self.stop()
        {
            self.start();
        }
        tracing::info!("⚙️ Scheduler settings updated");
        Ok(settings)
    }

    pub fn status(&self) -> EngineStatus {
        let started_at = lock(&self.running).as_ref().map(|r| r.started_at);
        let activity = lock(&self.activity).clone();
        EngineStatus {
            running: started_at.is_some(),
            enabled: self.settings().enabled,
            started_at,
            last_tick: activity.last_tick,
            last_sweep: activity.last_sweep,
            last_cleanup: activity.last_cleanup,
            executors: self.coordinator.executors().scheduler_types(),
            pool: self.pool().stats(),
        }
    }
}

async fn coordinator_loop(
    engine: Arc<SchedulerEngine>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        if let Err(e) = engine.sync_now() {
            tracing::warn!("⚠️ Coordinator tick aborted, retrying next tick: {e}");
        }
    }
    tracing::debug!("Coordinator loop exited");
}

async fn sweeper_loop(
    engine: Arc<SchedulerEngine>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    // The first tick fires immediately: that is the startup sweep.
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        if let Err(e) = engine.sweep_now() {
            tracing::warn!("⚠️ Recovery sweep aborted, retrying next pass: {e}");
        }
        if let Err(e) = engine.auto_cleanup() {
            tracing::warn!("⚠️ Retention cleanup failed: {e}");
        }
    }
    tracing::debug!("Sweeper loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskJob;
    use crate::intent::{IntentStatus, NewIntent};
    use crate::schedule::{StaticScheduleRegistry, kinds};
    use crate::time::local_instant;
    use chrono::{Duration, NaiveTime};
    use finclaw_core::config::ScheduleEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        local_instant(day(), NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn fixed_clock(t: DateTime<Utc>) -> Clock {
        Arc::new(move || t)
    }

    fn schedules() -> Arc<dyn ScheduleRegistry> {
        Arc::new(StaticScheduleRegistry::from_entries(&[
            ScheduleEntry {
                scheduler_type: kinds::FINANCE_SYNC.into(),
                entity_id: "bank-a".into(),
                entity_name: "Bank A".into(),
                enabled: true,
                time_of_day: "09:00".into(),
            },
            ScheduleEntry {
                scheduler_type: kinds::CONTENT_POST.into(),
                entity_id: "weekly-post".into(),
                entity_name: String::new(),
                enabled: true,
                time_of_day: "09:00".into(),
            },
        ]))
    }

    fn engine_at(t: DateTime<Utc>, calls: Arc<AtomicUsize>) -> Arc<SchedulerEngine> {
        let mut executors = ExecutorRegistry::new();
        for kind in [kinds::FINANCE_SYNC, kinds::CONTENT_POST] {
            let calls = calls.clone();
            executors.register_fn(kind, move |_job: TaskJob| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        Arc::new(SchedulerEngine::with_clock(
            Arc::new(IntentLedger::open_in_memory().unwrap()),
            schedules(),
            executors,
            SchedulerConfig::default(),
            fixed_clock(t),
        ))
    }

    #[tokio::test]
    async fn test_sync_now_dispatches_distinct_tasks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_at(at(9, 1), calls.clone());

        let report = engine.sync_now().unwrap();
        assert_eq!(report.expand.created, 2);
        assert_eq!(report.dispatch.dispatched.len(), 2);
        engine.wait_idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let summary = engine.query().summary().unwrap();
        assert_eq!(summary.by_status["completed"], 2);
        assert!(engine.status().last_tick.is_some());

        // Same window again: nothing new.
        let report = engine.sync_now().unwrap();
        assert_eq!(report.expand.existing, 2);
        assert!(report.dispatch.dispatched.is_empty());
    }

    #[tokio::test]
    async fn test_start_stop() {
        let engine = engine_at(at(9, 1), Arc::new(AtomicUsize::new(0)));
        assert!(!engine.is_running());
        assert!(engine.start());
        assert!(!engine.start());
        assert!(engine.is_running());
        assert!(engine.status().started_at.is_some());

        // The first coordinator tick fires immediately.
        let mut completed = 0;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            completed = engine
                .ledger()
                .list_by_status(IntentStatus::Completed)
                .unwrap()
                .len();
            if completed == 2 {
                break;
            }
        }
        assert_eq!(completed, 2);

        assert!(engine.stop());
        assert!(!engine.stop());
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_loops() {
        let engine = engine_at(at(9, 1), Arc::new(AtomicUsize::new(0)));
        engine.start();
        engine.shutdown().await;
        assert!(!engine.is_running());
        engine.wait_idle().await;
    }

    #[tokio::test]
    async fn test_sweep_dispatches_missed_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_at(at(11, 0), calls.clone());
        let start = at(9, 0);
        engine
            .ledger()
            .create_intent(
                &NewIntent {
                    scheduler_type: kinds::FINANCE_SYNC.into(),
                    task_id: "bank-z".into(),
                    task_name: "Bank Z".into(),
                    intended_date: day(),
                    intended_time: "09:00".into(),
                    execution_window_start: start,
                    execution_window_end: start + Duration::minutes(30),
                },
                start,
            )
            .unwrap();

        let report = engine.sweep_now().unwrap();
        assert_eq!(report.missed_pending.len(), 1);
        engine.wait_idle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_cleanup_runs_once_per_day() {
        let engine = engine_at(at(12, 0), Arc::new(AtomicUsize::new(0)));
        assert!(engine.auto_cleanup().unwrap().is_some());
        assert!(engine.auto_cleanup().unwrap().is_none());
        assert_eq!(engine.status().last_cleanup, Some(local_date(at(12, 0))));
    }

    #[tokio::test]
    async fn test_set_settings_validates_and_persists() {
        let engine = engine_at(at(9, 0), Arc::new(AtomicUsize::new(0)));

        let bad = SchedulerConfig {
            max_workers: 0,
            ..SchedulerConfig::default()
        };
        assert!(engine.set_settings(bad).is_err());
        assert_eq!(engine.settings(), SchedulerConfig::default());

        let good = SchedulerConfig {
            max_retries: 5,
            retry_delay_minutes: 10,
            max_workers: 2,
            ..SchedulerConfig::default()
        };
        engine.set_settings(good.clone()).unwrap();
        assert_eq!(engine.settings(), good);
        assert_eq!(engine.status().pool.max_workers, 2);
        assert_eq!(engine.ledger().load_settings().unwrap(), Some(good));
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_shrinking_pool_counts_running_executors() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut executors = ExecutorRegistry::new();
        {
            let gate = gate.clone();
            let peak = peak.clone();
            let in_flight = Arc::new(AtomicUsize::new(0));
            executors.register_fn(kinds::FINANCE_SYNC, move |_job: TaskJob| {
                let (gate, peak, in_flight) = (gate.clone(), peak.clone(), in_flight.clone());
                async move {
                    let running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(running, Ordering::SeqCst);
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        let entries: Vec<ScheduleEntry> = (1..=4)
            .map(|i| ScheduleEntry {
                scheduler_type: kinds::FINANCE_SYNC.into(),
                entity_id: format!("bank-{i}"),
                entity_name: String::new(),
                enabled: true,
                time_of_day: "09:00".into(),
            })
            .collect();
        let engine = Arc::new(SchedulerEngine::with_clock(
            Arc::new(IntentLedger::open_in_memory().unwrap()),
            Arc::new(StaticScheduleRegistry::from_entries(&entries)),
            executors,
            SchedulerConfig {
                max_workers: 2,
                ..SchedulerConfig::default()
            },
            fixed_clock(at(9, 1)),
        ));

        let report = engine.sync_now().unwrap();
        assert_eq!(report.dispatch.dispatched.len(), 2);
        assert_eq!(report.dispatch.pool_full, 2);

        engine
            .set_settings(SchedulerConfig {
                max_workers: 1,
                ..SchedulerConfig::default()
            })
            .unwrap();
        let report = engine.sync_now().unwrap();
        assert!(report.dispatch.dispatched.is_empty());
        assert_eq!(engine.status().pool.active, 2);
        assert_eq!(engine.status().pool.max_workers, 1);

        // One executor returns; the other still fills the single slot.
        gate.add_permits(1);
        until(|| engine.status().pool.active == 1).await;
        let report = engine.sync_now().unwrap();
        assert!(report.dispatch.dispatched.is_empty());

        gate.add_permits(1);
        until(|| engine.status().pool.active == 0).await;
        let report = engine.sync_now().unwrap();
        assert_eq!(report.dispatch.dispatched.len(), 1);

        gate.add_permits(4);
        engine.wait_idle().await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        let summary = engine.query().summary().unwrap();
        assert_eq!(summary.by_status["completed"], 3);
        assert_eq!(summary.by_status["pending"], 1);
    }
}
