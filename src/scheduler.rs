use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::EngineRegistry;
use crate::job::{JobQueue, JobUpdate, RenderJob};

const PROGRESS_RENDERING: f64 = 0.1;
const PROGRESS_DISPATCHED: f64 = 0.3;

/// Polls the queue and dispatches pending jobs to their engines
#[derive(Clone)]
pub struct Scheduler {
    queue: JobQueue,
    registry: Arc<EngineRegistry>,
    output_dir: PathBuf,
    poll_interval: Duration,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(queue: JobQueue, registry: Arc<EngineRegistry>, output_dir: PathBuf) -> Self {
        Self {
            queue,
            registry,
            output_dir,
            poll_interval: Duration::from_secs(1),
            max_concurrent: 1,
        }
    }

    pub fn from_config(config: &Config, queue: JobQueue, registry: Arc<EngineRegistry>) -> Self {
        Self::new(queue, registry, config.output.base_dir.clone())
            .with_poll_interval(config.scheduler.poll_interval())
            .with_max_concurrent(config.scheduler.max_concurrent_jobs)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Process every job pending at the start of the tick, in creation order.
    ///
    /// Returns the number of jobs dispatched.
    pub async fn tick(&self) -> usize {
        let pending = self.queue.list_pending().await;
        let count = pending.len();
        if count == 0 {
            return 0;
        }

        debug!("⏱️ Tick: {} pending job(s)", count);
        if self.max_concurrent == 1 {
            for job in pending {
                self.process_job(job).await;
            }
        } else {
            stream::iter(pending)
                .for_each_concurrent(self.max_concurrent, |job| self.process_job(job))
                .await;
        }
        count
    }

    /// Drive one job to a terminal state
    pub async fn process_job(&self, job: RenderJob) {
        let id = job.id.as_str();
        if self
            .queue
            .update_job(id, JobUpdate::rendering(PROGRESS_RENDERING))
            .await
            .is_none()
        {
            debug!("Job {} vanished before dispatch", id);
            return;
        }

        let engine = match self.registry.resolve(&job.spec.engine) {
            Ok(engine) => engine,
            Err(e) => {
                warn!("❌ Job {} failed: {}", id, e);
                self.queue.update_job(id, JobUpdate::failed(e.to_string())).await;
                return;
            }
        };

        self.queue
            .update_job(id, JobUpdate::progress(PROGRESS_DISPATCHED))
            .await;
        info!("🎬 Rendering job {} with {}", id, engine.name());

        let result = engine.render(&job.spec, &self.output_dir).await;
        let update = match (result.success, result.output_path) {
            (true, Some(path)) => {
                info!("✅ Job {} done: {}", id, path.display());
                JobUpdate::done(path)
            }
            _ => {
                let message = result
                    .error
                    .unwrap_or_else(|| "render produced no artifact".to_string());
                error!("❌ Job {} failed: {}", id, message);
                JobUpdate::failed(message)
            }
        };

        if self.queue.update_job(id, update).await.is_none() {
            debug!("Job {} was deleted during render; result dropped", id);
        }
    }

    /// Tick until no job is pending
    pub async fn drain(&self) {
        while self.tick().await > 0 {}
    }

    /// Tick on a fixed interval until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🚀 Scheduler started (tick {:?}, {} concurrent)", self.poll_interval, self.max_concurrent);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("🛑 Scheduler stopped");
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(receiver));
        SchedulerHandle { shutdown, task }
    }
}

/// Running scheduler task
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop after the current tick finishes
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
}
