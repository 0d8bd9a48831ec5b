//! Task executors: the "run this task" capability per scheduler type.
//!
//! The coordinator never knows what a finance sync or a browser replay
//! does; it looks up the executor registered for the intent's
//! `scheduler_type` and hands it a [`TaskJob`]. Adding a task family is a
//! registration at startup.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::intent::ExecutionIntent;

/// What an executor receives for one dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskJob {
    pub intent_id: String,
    pub scheduler_type: String,
    pub task_id: String,
    pub task_name: String,
    pub intended_date: NaiveDate,
    pub intended_time: String,
    /// 0 on the first attempt.
    pub attempt: u32,
}

impl From<&ExecutionIntent> for TaskJob {
    fn from(intent: &ExecutionIntent) -> Self {
        Self {
            intent_id: intent.id.clone(),
            scheduler_type: intent.scheduler_type.clone(),
            task_id: intent.task_id.clone(),
            task_name: intent.task_name.clone(),
            intended_date: intent.intended_date,
            intended_time: intent.intended_time.clone(),
            attempt: intent.retry_count,
        }
    }
}

/// Runs one task family. `Err` carries the message recorded on the intent.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, job: &TaskJob) -> Result<(), String>;
}

/// Adapter for plain async closures.
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(TaskJob) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), String>> + Send,
{
    async fn execute(&self, job: &TaskJob) -> Result<(), String> {
        (self.f)(job.clone()).await
    }
}

/// `scheduler_type → executor` map, resolved once at startup.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for a scheduler type.
    pub fn register(&mut self, scheduler_type: &str, executor: Arc<dyn TaskExecutor>) {
        if self
            .executors
            .insert(scheduler_type.to_string(), executor)
            .is_some()
        {
            tracing::warn!("⚠️ Executor for '{scheduler_type}' replaced");
        } else {
            tracing::info!("🔌 Executor registered: {scheduler_type}");
        }
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&mut self, scheduler_type: &str, f: F)
    where
        F: Fn(TaskJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.register(scheduler_type, Arc::new(FnExecutor::new(f)));
    }

    pub fn get(&self, scheduler_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(scheduler_type).cloned()
    }

    pub fn contains(&self, scheduler_type: &str) -> bool {
        self.executors.contains_key(scheduler_type)
    }

    /// Registered scheduler types, sorted.
    pub fn scheduler_types(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.executors.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(kind: &str) -> TaskJob {
        TaskJob {
            intent_id: "i-1".into(),
            scheduler_type: kind.into(),
            task_id: "bank-a".into(),
            task_name: "Bank A".into(),
            intended_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            intended_time: "09:00".into(),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn test_register_and_execute_fn() {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn("finance-sync", |job: TaskJob| async move {
            if job.task_id == "bank-a" {
                Ok(())
            } else {
                Err(format!("unknown bank {}", job.task_id))
            }
        });
        registry.register_fn("content-post", |_job: TaskJob| async move {
            Err("publisher offline".to_string())
        });

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.scheduler_types(), vec!["content-post", "finance-sync"]);
        assert!(!registry.contains("browser-replay"));
        assert!(registry.get("browser-replay").is_none());

        let finance = registry.get("finance-sync").unwrap();
        assert!(finance.execute(&job("finance-sync")).await.is_ok());

        let content = registry.get("content-post").unwrap();
        assert_eq!(
            content.execute(&job("content-post")).await,
            Err("publisher offline".to_string())
        );
    }
}
