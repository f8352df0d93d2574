//! Tracks background batch jobs for the HTTP layer.
//!
//! - `JobsState`: clonable, shared registry of job statuses and finished
//!   archives. It is injected into the Actix application state in `main.rs`.
//! - `JobUpdate`: a status change sent by a running batch.
//! - `start_job_updater`: long-running task that drains `JobUpdate`s from the
//!   MPSC channel and writes them into the registry, so batch tasks never need
//!   write access to the map while they run.
//! - `start_job_janitor`: periodic task that forgets finished jobs, and any
//!   archive nobody downloaded, once they are older than the retention period.

use crate::pipeline::archive::ArchivePayload;
use common::jobs::JobStatus;
use std::time::{Duration, Instant};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};

/// Shared state of all batch jobs known to this process.
#[derive(Clone)]
pub struct JobsState {
    /// Job id → latest status. Read by the status endpoint, written by the
    /// updater task and by the scheduler when a job is registered.
    pub jobs: Arc<RwLock<HashMap<String, JobStatus>>>,

    /// Archives of completed jobs waiting to be downloaded.
    pub archives: Arc<RwLock<HashMap<String, ArchivePayload>>>,

    /// When each job's batch task returned. Drives eviction.
    finished_at: Arc<RwLock<HashMap<String, Instant>>>,

    /// Sender side of the update channel consumed by `start_job_updater`.
    pub tx: mpsc::Sender<JobUpdate>,
}

impl JobsState {
    /// Creates an empty registry and the receiver to hand to `start_job_updater`.
    pub fn new(channel_capacity: usize) -> (Self, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let state = JobsState {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            archives: Arc::new(RwLock::new(HashMap::new())),
            finished_at: Arc::new(RwLock::new(HashMap::new())),
            tx,
        };
        (state, rx)
    }

    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Removes and returns the archive of a completed job.
    pub async fn take_archive(&self, job_id: &str) -> Option<ArchivePayload> {
        self.archives.write().await.remove(job_id)
    }

    /// Records that the batch task of `job_id` returned, storing its archive
    /// if it produced one. Starts the retention clock.
    pub async fn finish(&self, job_id: &str, archive: Option<ArchivePayload>) {
        if let Some(archive) = archive {
            self.archives.write().await.insert(job_id.to_string(), archive);
        }
        self.finished_at
            .write()
            .await
            .insert(job_id.to_string(), Instant::now());
    }

    /// Drops status and archive of every job that finished at least
    /// `retention` ago. Returns how many jobs were forgotten.
    ///
    /// A job whose final status has not reached the registry yet is kept
    /// until a later pass, so the updater cannot resurrect an evicted id.
    pub async fn evict_expired(&self, retention: Duration) -> usize {
        let mut finished_at = self.finished_at.write().await;
        let mut jobs = self.jobs.write().await;
        let mut archives = self.archives.write().await;

        let expired: Vec<String> = finished_at
            .iter()
            .filter(|(id, at)| {
                at.elapsed() >= retention
                    && jobs.get(id.as_str()).is_some_and(JobStatus::is_finished)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            finished_at.remove(id);
            jobs.remove(id);
            if archives.remove(id).is_some() {
                log::info!("Evicted undownloaded archive of job {}", id);
            }
        }
        expired.len()
    }
}

/// A status change for one job.
#[derive(Debug)]
pub struct JobUpdate {
    pub(crate) job_id: String,
    pub(crate) status: JobStatus,
}

impl JobUpdate {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
        }
    }
}

/// Applies every update received on `rx` to `jobs` until all senders are gone.
///
/// A finished status (`Completed`/`Failed`) is never overwritten by a late
/// `InProgress` update that was still queued.
pub async fn start_job_updater(
    jobs: Arc<RwLock<HashMap<String, JobStatus>>>,
    mut rx: mpsc::Receiver<JobUpdate>,
) {
    while let Some(update) = rx.recv().await {
        let mut registry = jobs.write().await;
        let finished = registry
            .get(&update.job_id)
            .is_some_and(|current| current.is_finished());
        if finished && !update.status.is_finished() {
            continue;
        }
        registry.insert(update.job_id, update.status);
    }
}

/// Calls `evict_expired` every `interval` for as long as the process runs.
pub async fn start_job_janitor(state: JobsState, retention: Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let evicted = state.evict_expired(retention).await;
        if evicted > 0 {
            log::debug!("Janitor forgot {} finished jobs", evicted);
        }
    }
}
