use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::spec::RenderSpec;

/// Lifecycle state of a render job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for the scheduler
    Pending,

    /// Dispatched to an engine
    Rendering,

    /// Artifact produced
    Done,

    /// Failed permanently
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Status only moves forward; terminal states never change
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (a, b) if a == b => !a.is_terminal(),
            (JobStatus::Pending, _) => true,
            (JobStatus::Rendering, JobStatus::Done | JobStatus::Error) => true,
            _ => false,
        }
    }
}

/// A queued request to produce one artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: String,
    pub spec: RenderSpec,
    pub status: JobStatus,

    /// Coarse liveness checkpoint in [0, 1]
    pub progress: f64,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub video_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Partial update applied by the scheduler
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub video_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn rendering(progress: f64) -> Self {
        Self {
            status: Some(JobStatus::Rendering),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn done(video_path: PathBuf) -> Self {
        Self {
            status: Some(JobStatus::Done),
            progress: Some(1.0),
            video_path: Some(video_path),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Status poll response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result query response, available once a job is done
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResultView {
    pub video_path: PathBuf,
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub rendering: usize,
    pub done: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct QueueInner {
    jobs: HashMap<String, RenderJob>,
    order: Vec<String>,
}

/// In-memory job store; exclusively owns every job record
#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    inner: Arc<RwLock<QueueInner>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending job with a fresh id
    pub async fn create_job(&self, spec: RenderSpec) -> RenderJob {
        let job = RenderJob {
            id: Uuid::new_v4().to_string(),
            spec,
            status: JobStatus::Pending,
            progress: 0.0,
            created_at: Utc::now(),
            completed_at: None,
            video_path: None,
            error: None,
        };

        let mut inner = self.inner.write().await;
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());

        info!("🆕 Queued job {} (engine: {})", job.id, job.spec.engine);
        job
    }

    pub async fn get_job(&self, id: &str) -> Option<RenderJob> {
        self.inner.read().await.jobs.get(id).cloned()
    }

    /// Apply a partial update; backwards status moves are dropped
    pub async fn update_job(&self, id: &str, update: JobUpdate) -> Option<RenderJob> {
        let mut inner = self.inner.write().await;
        let job = inner.jobs.get_mut(id)?;

        if let Some(next) = update.status {
            if !job.status.can_transition_to(next) {
                warn!(
                    "Ignoring update for job {}: {:?} -> {:?} is not allowed",
                    id, job.status, next
                );
                return Some(job.clone());
            }
            job.status = next;
            if next.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
        } else if job.status.is_terminal() {
            warn!("Ignoring update for finished job {}", id);
            return Some(job.clone());
        }

        if let Some(progress) = update.progress {
            job.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(path) = update.video_path {
            job.video_path = Some(path);
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }

        debug!("💾 Updated job {}: {:?} ({:.0}%)", id, job.status, job.progress * 100.0);
        Some(job.clone())
    }

    /// Remove a job record; an in-flight render is not interrupted
    pub async fn delete_job(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.jobs.remove(id).is_some();
        if removed {
            inner.order.retain(|existing| existing != id);
            info!("🗑️ Deleted job {}", id);
        }
        removed
    }

    /// All jobs in creation order
    pub async fn list_jobs(&self) -> Vec<RenderJob> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Pending jobs in creation order
    pub async fn list_pending(&self) -> Vec<RenderJob> {
        self.list_jobs()
            .await
            .into_iter()
            .filter(|job| job.status == JobStatus::Pending)
            .collect()
    }

    pub async fn status(&self, id: &str) -> Option<JobStatusView> {
        self.get_job(id).await.map(|job| JobStatusView {
            status: job.status,
            progress: job.progress,
            error: job.error,
        })
    }

    pub async fn result(&self, id: &str) -> Option<JobResultView> {
        let job = self.get_job(id).await?;
        match (job.status, job.video_path) {
            (JobStatus::Done, Some(video_path)) => Some(JobResultView { video_path }),
            _ => None,
        }
    }

    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.read().await;
        let mut stats = QueueStats {
            total: inner.jobs.len(),
            ..QueueStats::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Rendering => stats.rendering += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Error => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecDefaults;
    use crate::spec::SubmitRequest;
    use serde_json::json;
    use std::collections::HashSet;

    fn spec() -> RenderSpec {
        SubmitRequest::new("infographic", json!({"title": "t"}))
            .into_spec(&SpecDefaults::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_job_unique_ids() {
        let queue = JobQueue::new();
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let job = queue.create_job(spec()).await;
            assert_eq!(job.status, JobStatus::Pending);
            assert_eq!(job.progress, 0.0);
            assert!(ids.insert(job.id));
        }
        assert_eq!(queue.list_jobs().await.len(), 50);
    }

    #[tokio::test]
    async fn test_listing_preserves_creation_order() {
        let queue = JobQueue::new();
        let first = queue.create_job(spec()).await;
        let second = queue.create_job(spec()).await;
        let third = queue.create_job(spec()).await;

        let ids: Vec<String> = queue.list_pending().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let queue = JobQueue::new();
        let job = queue.create_job(spec()).await;

        queue.update_job(&job.id, JobUpdate::rendering(0.1)).await.unwrap();
        queue
            .update_job(&job.id, JobUpdate::done(PathBuf::from("/tmp/out.svg")))
            .await
            .unwrap();

        let after = queue
            .update_job(&job.id, JobUpdate::rendering(0.1))
            .await
            .unwrap();
        assert_eq!(after.status, JobStatus::Done);
        assert_eq!(after.progress, 1.0);

        let after = queue.update_job(&job.id, JobUpdate::failed("late")).await.unwrap();
        assert_eq!(after.status, JobStatus::Done);
        assert!(after.error.is_none());
        assert!(after.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_result_only_when_done() {
        let queue = JobQueue::new();
        let job = queue.create_job(spec()).await;
        assert!(queue.result(&job.id).await.is_none());

        queue.update_job(&job.id, JobUpdate::rendering(0.1)).await;
        queue
            .update_job(&job.id, JobUpdate::done(PathBuf::from("/tmp/a.svg")))
            .await;

        assert_eq!(
            queue.result(&job.id).await,
            Some(JobResultView {
                video_path: PathBuf::from("/tmp/a.svg")
            })
        );
        let status = queue.status(&job.id).await.unwrap();
        assert_eq!(status.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_delete_job() {
        let queue = JobQueue::new();
        let job = queue.create_job(spec()).await;

        assert!(queue.delete_job(&job.id).await);
        assert!(!queue.delete_job(&job.id).await);
        assert!(queue.get_job(&job.id).await.is_none());
        assert!(queue.update_job(&job.id, JobUpdate::progress(0.5)).await.is_none());
        assert_eq!(queue.stats().await.total, 0);
    }

    #[test]
    fn test_transition_rules() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Rendering));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Error));
        assert!(JobStatus::Rendering.can_transition_to(JobStatus::Rendering));
        assert!(!JobStatus::Rendering.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Error.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Done.can_transition_to(JobStatus::Rendering));
    }
}
