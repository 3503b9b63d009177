use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Started,
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct JobEntry {
    pub state: JobState,
    pub submitted_at: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// In-process registry for background crawl jobs: the stand-in for an
/// external scheduler/queue. Handed out ids are monotonic within the process.
#[derive(Clone, Default)]
pub struct JobRegistry {
    entries: Arc<RwLock<HashMap<String, JobEntry>>>,
    counter: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let job_id = format!("job-{n}");
        let submitted_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        self.entries.write().insert(
            job_id.clone(),
            JobEntry {
                state: JobState::Pending,
                submitted_at,
                result: None,
                error: None,
            },
        );
        job_id
    }

    pub fn mark_started(&self, job_id: &str) {
        self.update(job_id, |entry| entry.state = JobState::Started);
    }

    pub fn mark_success(&self, job_id: &str, result: serde_json::Value) {
        self.update(job_id, |entry| {
            entry.state = JobState::Success;
            entry.result = Some(result);
        });
    }

    pub fn mark_failure(&self, job_id: &str, error: String) {
        self.update(job_id, |entry| {
            entry.state = JobState::Failure;
            entry.error = Some(error);
        });
    }

    pub fn get(&self, job_id: &str) -> Option<JobEntry> {
        self.entries.read().get(job_id).cloned()
    }

    fn update(&self, job_id: &str, apply: impl FnOnce(&mut JobEntry)) {
        if let Some(entry) = self.entries.write().get_mut(job_id) {
            apply(entry);
        }
    }
}
