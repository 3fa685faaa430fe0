//! Test doubles shared by unit and integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dispatch::{Dispatcher, TaskSpec};
use crate::error::ApiError;
use crate::store::{Job, JobStatus, Store, User};

/// Dispatcher that records submitted specs and creates queued job records
/// without ever touching Docker. Jobs stay `Queued` forever.
pub struct StubDispatcher {
    store: Arc<dyn Store>,
    pub submitted: Mutex<Vec<TaskSpec>>,
}

impl StubDispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Dispatcher for StubDispatcher {
    async fn submit(&self, spec: TaskSpec, owner: &User) -> Result<Job, ApiError> {
        let job = Job {
            id: Uuid::new_v4(),
            user_id: owner.id,
            title: spec.title.clone(),
            created: Utc::now(),
            status: JobStatus::Queued,
            utm_folder_id: None,
            utm_output_folder_id: None,
        };
        self.store.insert_job(job.clone()).await;
        self.submitted.lock().await.push(spec);
        Ok(job)
    }
}
