use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ingest::PipelineStats;

pub type JobId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running {
        batch: usize,
        progress: PipelineStats,
    },
    Completed {
        stats: PipelineStats,
    },
    Failed {
        error: String,
    },
}

impl JobStatus {
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status registry for pipeline runs.
///
/// Cloning shares the same registry; separately constructed trackers are
/// fully independent.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl JobTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> JobId {
        let now = Utc::now();
        let id = Uuid::now_v7();
        self.jobs.write().await.insert(
            id,
            JobRecord {
                id,
                status: JobStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    pub async fn set_running(&self, id: JobId, batch: usize, progress: PipelineStats) {
        self.transition(id, JobStatus::Running { batch, progress })
            .await;
    }

    pub async fn complete(&self, id: JobId, stats: PipelineStats) {
        self.transition(id, JobStatus::Completed { stats }).await;
    }

    pub async fn fail(&self, id: JobId, error: impl Into<String>) {
        self.transition(
            id,
            JobStatus::Failed {
                error: error.into(),
            },
        )
        .await;
    }

    pub async fn remove(&self, id: JobId) -> Option<JobRecord> {
        self.jobs.write().await.remove(&id)
    }

    /// Drops finished jobs last updated before `cutoff`; returns how many were removed.
    pub async fn prune_finished(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, record| !(record.status.is_finished() && record.updated_at < cutoff));
        before - jobs.len()
    }

    // Unknown ids are ignored; finished jobs keep their final state.
    async fn transition(&self, id: JobId, status: JobStatus) {
        let mut jobs = self.jobs.write().await;
        if let Some(record) = jobs.get_mut(&id) {
            if record.status.is_finished() {
                return;
            }
            record.status = status;
            record.updated_at = Utc::now();
        }
    }
}
