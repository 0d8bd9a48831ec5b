//! Execution coordinator: the only writer that originates intents and
//! performs dispatch.
//!
//! One pass (`tick`):
//! 1. expand every enabled schedule whose time has arrived today into an
//!    intent (a conflict means it already exists, which is fine);
//! 2. reopen failed intents whose retry delay has elapsed;
//! 3. claim every due pending intent and hand it to its executor.
//!
//! Dispatch is fire-and-continue. The executor runs on its own tokio task
//! holding a worker-pool permit and reports back through the ledger.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use finclaw_core::config::SchedulerConfig;
use finclaw_core::error::Result;

use crate::executor::{ExecutorRegistry, TaskExecutor, TaskJob};
use crate::intent::{CreateOutcome, IntentStatus, NewIntent};
use crate::ledger::IntentLedger;
use crate::pool::{WorkerPermit, WorkerPool};
use crate::schedule::{ScheduleDefinition, ScheduleRegistry};
use crate::time::{Clock, format_time_of_day, local_date, local_instant};

/// What schedule expansion did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpandReport {
    pub created: usize,
    /// Today's intent already existed.
    pub existing: usize,
    /// Time of day not reached yet.
    pub not_due: usize,
    /// Window already closed and catch-up is off.
    pub skipped_missed: usize,
    /// Today's intent was cancelled by an operator.
    pub cancelled: usize,
}

/// What a dispatch pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub dispatched: Vec<String>,
    /// Left pending: no executor registered for the type.
    pub no_executor: usize,
    /// Left pending: pool or lane full.
    pub pool_full: usize,
    /// Another claimant moved the intent first.
    pub lost_claims: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub expand: ExpandReport,
    pub reopened: usize,
    pub dispatch: DispatchReport,
}

pub struct ExecutionCoordinator {
    ledger: Arc<IntentLedger>,
    schedules: Arc<dyn ScheduleRegistry>,
    executors: Arc<ExecutorRegistry>,
    clock: Clock,
}

impl ExecutionCoordinator {
    pub fn new(
        ledger: Arc<IntentLedger>,
        schedules: Arc<dyn ScheduleRegistry>,
        executors: Arc<ExecutorRegistry>,
        clock: Clock,
    ) -> Self {
        Self {
            ledger,
            schedules,
            executors,
            clock,
        }
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    pub fn schedules(&self) -> &Arc<dyn ScheduleRegistry> {
        &self.schedules
    }

    /// One full pass at `now`. Storage errors abort the pass; every step is
    /// idempotent so the next tick simply tries again.
    pub fn tick(
        &self,
        settings: &SchedulerConfig,
        pool: &Arc<WorkerPool>,
        now: DateTime<Utc>,
    ) -> Result<TickReport> {
        let expand = self.expand_schedules(settings, now)?;
        let reopened = self.retry_failed(settings, now)?;
        let dispatch = self.dispatch_due(pool, now)?;

        if expand.created > 0 || reopened > 0 || !dispatch.dispatched.is_empty() {
            tracing::info!(
                "⏱️ Tick: {} created, {} reopened, {} dispatched",
                expand.created,
                reopened,
                dispatch.dispatched.len()
            );
        } else {
            tracing::debug!("⏱️ Tick: nothing to do");
        }

        Ok(TickReport {
            expand,
            reopened,
            dispatch,
        })
    }

    /// Turn today's due schedules into pending intents.
    pub fn expand_schedules(
        &self,
        settings: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> Result<ExpandReport> {
        let today = local_date(now);
        let grace = Duration::minutes(i64::from(settings.grace_period_minutes));
        let mut report = ExpandReport::default();

        for schedule in self.schedules.list_enabled_schedules(None)? {
            let window_start = local_instant(today, schedule.time_of_day);
            let window_end = window_start + grace;
            if now < window_start {
                report.not_due += 1;
                continue;
            }
            if now > window_end && !settings.catch_up_missed {
                report.skipped_missed += 1;
                continue;
            }

            if self
                .ledger
                .is_cancelled_for_key(&schedule.scheduler_type, &schedule.entity_id, today)?
            {
                report.cancelled += 1;
                continue;
            }

            let new = new_intent(&schedule, today, window_start, window_end);
            match self.ledger.create_intent(&new, now)? {
                CreateOutcome::Created(_) => report.created += 1,
                CreateOutcome::Conflict { .. } => report.existing += 1,
            }
        }
        Ok(report)
    }

    /// Reopen failed intents whose retry delay has elapsed and whose budget
    /// is not exhausted.
    pub fn retry_failed(&self, settings: &SchedulerConfig, now: DateTime<Utc>) -> Result<usize> {
        let delay = Duration::minutes(i64::from(settings.retry_delay_minutes));
        let mut reopened = 0;
        for intent in self.ledger.list_by_status(IntentStatus::Failed)? {
            if !intent.can_retry(settings.max_retries) {
                continue;
            }
            let due = intent.failed_at.is_none_or(|failed| failed + delay <= now);
            if due && self.ledger.reopen_for_retry(&intent.id, settings.max_retries, now)? {
                reopened += 1;
                tracing::info!(
                    "🔁 Retry {}/{} for {}/{} ({})",
                    intent.retry_count,
                    settings.max_retries,
                    intent.scheduler_type,
                    intent.task_id,
                    intent.id
                );
            }
        }
        Ok(reopened)
    }

    /// Claim and dispatch every pending intent whose window has opened.
    pub fn dispatch_due(&self, pool: &Arc<WorkerPool>, now: DateTime<Utc>) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        for intent in self.ledger.list_due_pending(now)? {
            let Some(executor) = self.executors.get(&intent.scheduler_type) else {
                report.no_executor += 1;
                tracing::warn!(
                    "⚠️ No executor for '{}', intent {} stays pending",
                    intent.scheduler_type,
                    intent.id
                );
                continue;
            };
            // Slot first: a claimed intent must always have a worker.
            let Some(permit) = pool.try_acquire(&intent.scheduler_type) else {
                report.pool_full += 1;
                continue;
            };
            match self.ledger.claim_attempt(&intent.id, intent.retry_count, now) {
                Ok(true) => {}
                Ok(false) => {
                    permit.release();
                    report.lost_claims += 1;
                    continue;
                }
                Err(e) => {
                    permit.release();
                    return Err(e);
                }
            }

            self.spawn_executor(TaskJob::from(&intent), executor, permit);
            report.dispatched.push(intent.id);
        }
        if report.pool_full > 0 {
            tracing::debug!("🚦 Worker pool full, {} intent(s) wait for the next tick", report.pool_full);
        }
        Ok(report)
    }

    fn spawn_executor(
        &self,
        job: TaskJob,
        executor: Arc<dyn TaskExecutor>,
        permit: WorkerPermit,
    ) {
        let ledger = self.ledger.clone();
        let clock = self.clock.clone();
        tracing::info!(
            "🚀 Dispatching {}/{} (attempt {}, intent {})",
            job.scheduler_type,
            job.task_id,
            job.attempt + 1,
            job.intent_id
        );

        tokio::spawn(async move {
            let intent_id = job.intent_id.clone();
            let attempt = job.attempt;
            // Inner task so an executor panic surfaces as a JoinError.
            let run = tokio::spawn(async move { executor.execute(&job).await });
            let outcome = match run.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(message)) => Err(message),
                Err(e) => Err(join_error_message(e)),
            };

            let now = clock();
            let recorded = match &outcome {
                Ok(()) => ledger.complete_attempt(&intent_id, attempt, now),
                Err(message) => ledger.fail_attempt(&intent_id, attempt, message, now),
            };
            match (&outcome, recorded) {
                (Ok(()), Ok(true)) => tracing::info!("✅ Intent {intent_id} completed"),
                (Err(message), Ok(true)) => {
                    tracing::warn!("❌ Intent {intent_id} failed: {message}")
                }
                // Cancelled, swept or re-dispatched meanwhile; the ledger logged it.
                (_, Ok(false)) => {}
                (_, Err(e)) => {
                    tracing::error!("💥 Could not record outcome of intent {intent_id}: {e}")
                }
            }
            permit.finish(outcome.is_ok());
        });
    }
}

fn new_intent(
    schedule: &ScheduleDefinition,
    date: chrono::NaiveDate,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> NewIntent {
    NewIntent {
        scheduler_type: schedule.scheduler_type.clone(),
        task_id: schedule.entity_id.clone(),
        task_name: schedule.entity_name.clone(),
        intended_date: date,
        intended_time: format_time_of_day(schedule.time_of_day),
        execution_window_start: window_start,
        execution_window_end: window_end,
    }
}

fn join_error_message(e: tokio::task::JoinError) -> String {
    if e.is_cancelled() {
        return "executor task was cancelled".to_string();
    }
    let payload = e.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("executor panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{StaticScheduleRegistry, kinds};
    use crate::time::local_instant;
    use chrono::{NaiveDate, NaiveTime};
    use finclaw_core::config::ScheduleEntry;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Settable clock for driving ticks by hand.
    #[derive(Clone)]
    struct TestClock(Arc<Mutex<DateTime<Utc>>>);

    impl TestClock {
        fn at(t: DateTime<Utc>) -> Self {
            Self(Arc::new(Mutex::new(t)))
        }
        fn set(&self, t: DateTime<Utc>) {
            *self.0.lock().unwrap() = t;
        }
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
        fn clock(&self) -> Clock {
            let inner = self.0.clone();
            Arc::new(move || *inner.lock().unwrap())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        local_instant(day(), NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn bank_a() -> Arc<dyn ScheduleRegistry> {
        Arc::new(StaticScheduleRegistry::from_entries(&[ScheduleEntry {
            scheduler_type: kinds::FINANCE_SYNC.into(),
            entity_id: "bank-a".into(),
            entity_name: "Bank A".into(),
            enabled: true,
            time_of_day: "09:00".into(),
        }]))
    }

    fn pool() -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new(4, &BTreeMap::new()))
    }

    fn settings() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    type Reply = tokio::sync::oneshot::Sender<std::result::Result<(), String>>;

    /// Finance-sync executor whose calls block until released, in call order.
    #[derive(Clone, Default)]
    struct Gate(Arc<Mutex<Vec<Option<Reply>>>>);

    impl Gate {
        fn executors(&self) -> Arc<ExecutorRegistry> {
            let calls = self.0.clone();
            let mut executors = ExecutorRegistry::new();
            executors.register_fn(kinds::FINANCE_SYNC, move |_job: TaskJob| {
                let (tx, rx) = tokio::sync::oneshot::channel();
                calls.lock().unwrap().push(Some(tx));
                async move { rx.await.unwrap_or_else(|_| Err("gate dropped".to_string())) }
            });
            Arc::new(executors)
        }

        fn calls(&self) -> usize {
            self.0.lock().unwrap().len()
        }

        async fn wait_for_calls(&self, n: usize) {
            while self.calls() < n {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        }

        fn reply(&self, call: usize, result: std::result::Result<(), String>) {
            let tx = self.0.lock().unwrap()[call].take().unwrap();
            tx.send(result).unwrap();
        }
    }

    #[tokio::test]
    async fn test_bank_a_fails_then_retries_to_completion() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(9, 0));
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut executors = ExecutorRegistry::new();
        let counter = attempts.clone();
        executors.register_fn(kinds::FINANCE_SYNC, move |_job: TaskJob| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("bank session expired".to_string())
                } else {
                    Ok(())
                }
            }
        });
        let coordinator =
            ExecutionCoordinator::new(ledger.clone(), bank_a(), Arc::new(executors), clock.clock());
        let cfg = settings();
        let pool = pool();

        // 09:00: exactly one pending intent for today.
        let expand = coordinator.expand_schedules(&cfg, clock.now()).unwrap();
        assert_eq!(expand.created, 1);
        let today = ledger.list_for_date(day()).unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].status, IntentStatus::Pending);
        let id = today[0].id.clone();

        // 09:01: claimed and dispatched; the executor fails.
        clock.set(at(9, 1));
        let report = coordinator.tick(&cfg, &pool, clock.now()).unwrap();
        assert_eq!(report.expand.existing, 1);
        assert_eq!(report.dispatch.dispatched, vec![id.clone()]);
        pool.wait_idle().await;
        let failed = ledger.get(&id).unwrap().unwrap();
        assert_eq!(failed.status, IntentStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_message.as_deref(), Some("bank session expired"));

        // Before the retry delay nothing happens.
        clock.set(at(9, 3));
        let report = coordinator.tick(&cfg, &pool, clock.now()).unwrap();
        assert_eq!(report.reopened, 0);
        assert!(report.dispatch.dispatched.is_empty());

        // retry_delay_minutes later it is reopened and re-dispatched.
        clock.set(at(9, 1) + Duration::minutes(i64::from(cfg.retry_delay_minutes)));
        let report = coordinator.tick(&cfg, &pool, clock.now()).unwrap();
        assert_eq!(report.reopened, 1);
        assert_eq!(report.dispatch.dispatched, vec![id.clone()]);
        pool.wait_idle().await;

        let done = ledger.get(&id).unwrap().unwrap();
        assert_eq!(done.status, IntentStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.retry_count, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_two_ticks_in_same_window_create_one_intent() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(9, 5));
        let coordinator = ExecutionCoordinator::new(
            ledger.clone(),
            bank_a(),
            Arc::new(ExecutorRegistry::new()),
            clock.clock(),
        );
        let cfg = settings();

        let first = coordinator.expand_schedules(&cfg, at(9, 5)).unwrap();
        let second = coordinator.expand_schedules(&cfg, at(9, 6)).unwrap();
        assert_eq!(first.created, 1);
        assert_eq!(second.created, 0);
        assert_eq!(second.existing, 1);
        assert_eq!(ledger.list_for_date(day()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_not_due_before_time_of_day() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(8, 59));
        let coordinator = ExecutionCoordinator::new(
            ledger.clone(),
            bank_a(),
            Arc::new(ExecutorRegistry::new()),
            clock.clock(),
        );
        let report = coordinator.expand_schedules(&settings(), clock.now()).unwrap();
        assert_eq!(report.not_due, 1);
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_catch_up_disabled_skips_closed_window() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(11, 0));
        let coordinator = ExecutionCoordinator::new(
            ledger.clone(),
            bank_a(),
            Arc::new(ExecutorRegistry::new()),
            clock.clock(),
        );
        let mut cfg = settings();
        cfg.catch_up_missed = false;
        let report = coordinator.expand_schedules(&cfg, clock.now()).unwrap();
        assert_eq!(report.skipped_missed, 1);
        assert_eq!(ledger.count().unwrap(), 0);

        cfg.catch_up_missed = true;
        let report = coordinator.expand_schedules(&cfg, clock.now()).unwrap();
        assert_eq!(report.created, 1);
    }

    #[tokio::test]
    async fn test_missing_executor_leaves_intent_pending() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(9, 1));
        let coordinator = ExecutionCoordinator::new(
            ledger.clone(),
            bank_a(),
            Arc::new(ExecutorRegistry::new()),
            clock.clock(),
        );
        let report = coordinator.tick(&settings(), &pool(), clock.now()).unwrap();
        assert_eq!(report.expand.created, 1);
        assert_eq!(report.dispatch.no_executor, 1);
        let intents = ledger.list_by_status(IntentStatus::Pending).unwrap();
        assert_eq!(intents.len(), 1);
    }

    #[tokio::test]
    async fn test_executor_panic_becomes_failure() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(9, 1));
        let mut executors = ExecutorRegistry::new();
        executors.register_fn(kinds::FINANCE_SYNC, |_job: TaskJob| async move {
            if true {
                panic!("scraper crashed");
            }
            Ok(())
        });
        let coordinator =
            ExecutionCoordinator::new(ledger.clone(), bank_a(), Arc::new(executors), clock.clock());
        let pool = pool();
        let report = coordinator.tick(&settings(), &pool, clock.now()).unwrap();
        assert_eq!(report.dispatch.dispatched.len(), 1);
        pool.wait_idle().await;

        let intent = ledger.get(&report.dispatch.dispatched[0]).unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Failed);
        assert_eq!(intent.retry_count, 1);
        assert!(intent.error_message.unwrap().contains("scraper crashed"));
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_full_pool_leaves_intent_pending() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(9, 1));
        let mut executors = ExecutorRegistry::new();
        executors.register_fn(kinds::FINANCE_SYNC, |_job: TaskJob| async move { Ok(()) });
        let coordinator =
            ExecutionCoordinator::new(ledger.clone(), bank_a(), Arc::new(executors), clock.clock());
        let pool = Arc::new(WorkerPool::new(1, &BTreeMap::new()));
        let held = pool.try_acquire("other").unwrap();

        let report = coordinator.tick(&settings(), &pool, clock.now()).unwrap();
        assert_eq!(report.dispatch.pool_full, 1);
        assert_eq!(ledger.list_by_status(IntentStatus::Pending).unwrap().len(), 1);

        held.finish(true);
        let report = coordinator.tick(&settings(), &pool, clock.now()).unwrap();
        assert_eq!(report.dispatch.dispatched.len(), 1);
        pool.wait_idle().await;
        assert_eq!(ledger.list_by_status(IntentStatus::Completed).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_intent_is_never_claimed() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(8, 0));
        let mut executors = ExecutorRegistry::new();
        executors.register_fn(kinds::FINANCE_SYNC, |_job: TaskJob| async move { Ok(()) });
        let coordinator =
            ExecutionCoordinator::new(ledger.clone(), bank_a(), Arc::new(executors), clock.clock());
        let cfg = settings();

        coordinator.expand_schedules(&cfg, at(9, 0)).unwrap();
        let id = ledger.list_for_date(day()).unwrap()[0].id.clone();
        assert!(ledger.cancel(&id, at(9, 0)).unwrap());

        // The freed key is not re-expanded and nothing is dispatched.
        let report = coordinator.tick(&cfg, &pool(), at(9, 2)).unwrap();
        assert_eq!(report.expand.cancelled, 1);
        assert_eq!(report.expand.created, 0);
        assert!(report.dispatch.dispatched.is_empty());
        assert!(!ledger.claim(&id, at(9, 3)).unwrap());
        assert_eq!(ledger.get(&id).unwrap().unwrap().status, IntentStatus::Cancelled);
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_result_of_swept_attempt_does_not_touch_its_retry() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(9, 1));
        let gate = Gate::default();
        let coordinator =
            ExecutionCoordinator::new(ledger.clone(), bank_a(), gate.executors(), clock.clock());
        let sweeper = crate::recovery::RecoverySweeper::new(ledger.clone());
        let cfg = settings();
        let pool = pool();

        // Attempt 1 hangs past the stuck threshold and is swept.
        let report = coordinator.tick(&cfg, &pool, clock.now()).unwrap();
        let id = report.dispatch.dispatched[0].clone();
        gate.wait_for_calls(1).await;
        clock.set(at(10, 5));
        let swept = sweeper.sweep(&cfg, clock.now()).unwrap();
        assert_eq!(swept.recovered_stuck, vec![id.clone()]);

        // Attempt 2 is dispatched once the retry delay has passed.
        clock.set(at(10, 11));
        let report = coordinator.tick(&cfg, &pool, clock.now()).unwrap();
        assert_eq!(report.reopened, 1);
        assert_eq!(report.dispatch.dispatched, vec![id.clone()]);
        gate.wait_for_calls(2).await;

        // Attempt 1 finally returns an error while attempt 2 is running.
        gate.reply(0, Err("late failure of attempt 1".to_string()));
        while pool.stats().failed < 1 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let intent = ledger.get(&id).unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Running);
        assert_eq!(intent.retry_count, 1);
        assert_ne!(intent.error_message.as_deref(), Some("late failure of attempt 1"));

        // No third executor for the same key.
        clock.set(at(10, 30));
        let report = coordinator.tick(&cfg, &pool, clock.now()).unwrap();
        assert_eq!(report.reopened, 0);
        assert!(report.dispatch.dispatched.is_empty());
        assert_eq!(gate.calls(), 2);

        gate.reply(1, Ok(()));
        pool.wait_idle().await;
        let done = ledger.get(&id).unwrap().unwrap();
        assert_eq!(done.status, IntentStatus::Completed);
        assert_eq!(done.retry_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_while_running_ignores_late_result() {
        let ledger = Arc::new(IntentLedger::open_in_memory().unwrap());
        let clock = TestClock::at(at(9, 1));
        let gate = Gate::default();
        let coordinator =
            ExecutionCoordinator::new(ledger.clone(), bank_a(), gate.executors(), clock.clock());
        let cfg = settings();
        let pool = pool();

        let report = coordinator.tick(&cfg, &pool, clock.now()).unwrap();
        let id = report.dispatch.dispatched[0].clone();
        gate.wait_for_calls(1).await;

        assert!(ledger.cancel(&id, at(9, 2)).unwrap());
        let report = coordinator.tick(&cfg, &pool, at(9, 3)).unwrap();
        assert_eq!(report.expand.cancelled, 1);
        assert!(report.dispatch.dispatched.is_empty());

        // The executor is not aborted; its result is dropped.
        gate.reply(0, Ok(()));
        pool.wait_idle().await;
        let intent = ledger.get(&id).unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Cancelled);
        assert!(intent.completed_at.is_none());
        assert!(intent.error_message.is_none());
        assert_eq!(intent.retry_count, 0);
        assert_eq!(gate.calls(), 1);
    }

    #[tokio::test]
    async fn test_join_error_message_for_string_panic() {
        let err = tokio::spawn(async { panic!("{}", String::from("boom")) })
            .await
            .unwrap_err();
        assert_eq!(join_error_message(err), "executor panicked: boom");
    }
}
