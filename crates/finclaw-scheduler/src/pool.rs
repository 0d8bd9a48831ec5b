//! Worker pool: bounds concurrent executor dispatches.
//!
//! One global semaphore caps the total number of executors in flight
//! (prevents unbounded parallel bank/browser sessions). Scheduler types
//! listed in `per_type_limits` get their own lane on top of that, so a
//! burst of browser replays can't starve finance syncs.
//!
//! Permits are taken with `try_acquire`: the coordinator never blocks on a
//! full pool, it leaves the intent pending for the next tick.
//!
//! Limits are resized in place. Shrinking below the number of executors in
//! flight retires their permits as they come back instead of handing them
//! out again.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// A resizable slot count.
struct Limiter {
    semaphore: Arc<Semaphore>,
    limit: AtomicUsize,
    /// Permits to retire when they are released, left over from a shrink.
    debt: AtomicUsize,
    active: AtomicUsize,
    idle: Notify,
}

impl Limiter {
    fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit: AtomicUsize::new(limit),
            debt: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    fn try_acquire(self: &Arc<Self>) -> Option<Slot> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Some(Slot {
            limiter: self.clone(),
            permit: Some(permit),
        })
    }

    fn limit(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Take one unit of shrink debt, if any is outstanding.
    fn take_debt(&self) -> bool {
        self.debt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
            .is_ok()
    }

    fn resize(&self, new_limit: usize) {
        let old = self.limit.swap(new_limit, Ordering::SeqCst);
        if new_limit > old {
            let mut grow = new_limit - old;
            while grow > 0 && self.take_debt() {
                grow -= 1;
            }
            self.semaphore.add_permits(grow);
        } else if new_limit < old {
            let shrink = old - new_limit;
            let forgotten = self.semaphore.forget_permits(shrink);
            self.debt.fetch_add(shrink - forgotten, Ordering::SeqCst);
        }
    }
}

/// One held slot of a [`Limiter`].
struct Slot {
    limiter: Arc<Limiter>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            if self.limiter.take_debt() {
                permit.forget();
            }
        }
        if self.limiter.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.limiter.idle.notify_waiters();
        }
    }
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

pub struct WorkerPool {
    global: Arc<Limiter>,
    lanes: RwLock<HashMap<String, Arc<Limiter>>>,
    counters: Arc<Counters>,
}

/// Held by a dispatched executor task for its whole lifetime.
pub struct WorkerPermit {
    _lane: Option<Slot>,
    _global: Slot,
    counters: Arc<Counters>,
    finished: bool,
}

impl WorkerPermit {
    /// Record the executor outcome. Consumes the permit, freeing the slot.
    pub fn finish(mut self, success: bool) {
        let counter = if success {
            &self.counters.completed
        } else {
            &self.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.finished = true;
    }

    /// Give the slot back unused (the claim was lost).
    pub fn release(mut self) {
        self.finished = true;
    }
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        if !self.finished {
            // Dropped without an outcome (task aborted); count it as failed.
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn lane_limits(
    max_workers: usize,
    per_type_limits: &BTreeMap<String, usize>,
) -> impl Iterator<Item = (&String, usize)> {
    per_type_limits
        .iter()
        .map(move |(kind, limit)| (kind, (*limit).clamp(1, max_workers)))
}

impl WorkerPool {
    pub fn new(max_workers: usize, per_type_limits: &BTreeMap<String, usize>) -> Self {
        let max_workers = max_workers.max(1);
        let lanes = lane_limits(max_workers, per_type_limits)
            .map(|(kind, limit)| (kind.clone(), Limiter::new(limit)))
            .collect();
        Self {
            global: Limiter::new(max_workers),
            lanes: RwLock::new(lanes),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Apply new limits without dropping track of executors in flight.
    /// Lanes keep counting their held slots; a lane that is no longer listed
    /// stops limiting new dispatches.
    pub fn resize(&self, max_workers: usize, per_type_limits: &BTreeMap<String, usize>) {
        let max_workers = max_workers.max(1);
        let mut lanes = self.lanes.write().unwrap_or_else(PoisonError::into_inner);
        self.global.resize(max_workers);
        lanes.retain(|kind, _| per_type_limits.contains_key(kind));
        for (kind, limit) in lane_limits(max_workers, per_type_limits) {
            lanes
                .entry(kind.clone())
                .and_modify(|lane| lane.resize(limit))
                .or_insert_with(|| Limiter::new(limit));
        }
    }

    /// Take a slot for `scheduler_type`, or `None` if the pool or that
    /// type's lane is full.
    pub fn try_acquire(&self, scheduler_type: &str) -> Option<WorkerPermit> {
        let lane = {
            let lanes = self.lanes.read().unwrap_or_else(PoisonError::into_inner);
            match lanes.get(scheduler_type) {
                Some(lane) => Some(lane.try_acquire()?),
                None => None,
            }
        };
        let global = self.global.try_acquire()?;
        Some(WorkerPermit {
            _lane: lane,
            _global: global,
            counters: self.counters.clone(),
            finished: false,
        })
    }

    /// Executors currently holding a slot.
    pub fn active(&self) -> usize {
        self.global.active()
    }

    pub fn available(&self) -> usize {
        self.global.available()
    }

    pub fn max_workers(&self) -> usize {
        self.global.limit()
    }

    /// Resolve once every in-flight executor has released its slot.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.global.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.global.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let mut lanes: Vec<LaneStats> = self
            .lanes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(kind, lane)| LaneStats {
                scheduler_type: kind.clone(),
                limit: lane.limit(),
                active: lane.active(),
            })
            .collect();
        lanes.sort_by(|a, b| a.scheduler_type.cmp(&b.scheduler_type));
        PoolStats {
            max_workers: self.max_workers(),
            active: self.active(),
            available: self.available(),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            lanes,
        }
    }
}

/// Live pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub max_workers: usize,
    pub active: usize,
    pub available: usize,
    pub completed: u64,
    pub failed: u64,
    pub lanes: Vec<LaneStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneStats {
    pub scheduler_type: String,
    pub limit: usize,
    pub active: usize,
}
