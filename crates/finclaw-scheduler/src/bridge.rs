//! HTTP bridge executor: forwards a dispatch to the host application.
//!
//! The concrete task families (bank scraper, container manager, browser
//! replay runner, content publisher) live in the host. Each one exposes an
//! endpoint; the bridge POSTs the [`TaskJob`] as JSON and treats any 2xx as
//! success. Everything else becomes the intent's error message.

use async_trait::async_trait;
use std::time::Duration;

use finclaw_core::config::ExecutorEntry;
use finclaw_core::error::{FinClawError, Result};

use crate::executor::{TaskExecutor, TaskJob};

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

pub struct HttpExecutor {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl HttpExecutor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers: Vec::new(),
            timeout,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Build from an `[[executors]]` config entry.
    pub fn from_entry(entry: &ExecutorEntry) -> Result<Self> {
        if entry.url.trim().is_empty() {
            return Err(FinClawError::Config(format!(
                "executor for '{}' has an empty url",
                entry.scheduler_type
            )));
        }
        if !entry.url.starts_with("http://") && !entry.url.starts_with("https://") {
            return Err(FinClawError::Config(format!(
                "executor for '{}' has a non-http url: {}",
                entry.scheduler_type, entry.url
            )));
        }
        let mut executor = Self::new(&entry.url, Duration::from_secs(entry.timeout_secs.max(1)));
        for (key, value) in &entry.headers {
            executor = executor.with_header(key, value);
        }
        Ok(executor)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskExecutor for HttpExecutor {
    async fn execute(&self, job: &TaskJob) -> std::result::Result<(), String> {
        let mut req = self.client.post(&self.url).json(job).timeout(self.timeout);
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                format!("executor timed out after {}s", self.timeout.as_secs())
            } else {
                format!("executor request failed: {e}")
            }
        })?;

        if resp.status().is_success() {
            tracing::debug!("✅ Bridge {} accepted {}", self.url, job.intent_id);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(error_message(status.as_u16(), &body))
        }
    }
}

fn error_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("executor returned HTTP {status}");
    }
    let mut end = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("executor returned HTTP {status}: {}", &body[..end])
}
