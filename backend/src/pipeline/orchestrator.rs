//! Wires the transform jobs of a batch into the task pool and the pool's
//! output into the archive assembler.

use crate::job_controller::pool::{Settled, TaskPool};
use crate::pipeline::archive::{assemble, ArchivePayload};
use crate::pipeline::error::{BatchError, TransformError};
use crate::pipeline::geometry::GeometryConfig;
use crate::pipeline::transform::{transform, InputItem, JobFailure};
use log::{info, warn};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use zip::result::ZipError;

/// Per-image failure with the position of the image in the batch.
#[derive(Debug)]
pub struct FailedItem {
    pub index: usize,
    pub name: String,
    pub error: TransformError,
}

/// Archive plus the items that did not make it into it.
#[derive(Debug)]
pub struct BatchReport {
    pub archive: ArchivePayload,
    pub total: usize,
    pub failures: Vec<FailedItem>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.total - self.failures.len()
    }

    /// One-line summary suitable for a job status message.
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            format!("Processed {} of {} images", self.succeeded(), self.total)
        } else {
            let names: Vec<&str> = self.failures.iter().map(|f| f.name.as_str()).collect();
            format!(
                "Processed {} of {} images (failed: {})",
                self.succeeded(),
                self.total,
                names.join(", ")
            )
        }
    }
}

/// Transforms `items` with at most `limit` in flight and returns the archive.
///
/// Fails only on configuration errors (before any job starts) or when the
/// archive cannot be written. Images that fail to transform are left out.
pub async fn process_batch<P>(
    items: Vec<InputItem>,
    geometry: GeometryConfig,
    limit: usize,
    on_progress: P,
) -> Result<ArchivePayload, BatchError>
where
    P: FnMut(usize, usize),
{
    run_batch(items, geometry, limit, on_progress)
        .await
        .map(|report| report.archive)
}

/// Like [`process_batch`], also reporting which items failed.
pub async fn run_batch<P>(
    items: Vec<InputItem>,
    geometry: GeometryConfig,
    limit: usize,
    on_progress: P,
) -> Result<BatchReport, BatchError>
where
    P: FnMut(usize, usize),
{
    let pool = TaskPool::new(limit)?;
    geometry.validate()?;

    let start = Instant::now();
    let total = items.len();
    info!(
        "batch: {} images, limit {}, page {}x{} px at {} dpi",
        total, limit, geometry.page_width, geometry.page_height, geometry.dpi
    );

    let geometry = Arc::new(geometry);
    let jobs: Vec<_> = items
        .into_iter()
        .map(|item| {
            let geometry = Arc::clone(&geometry);
            move || transform(item, geometry)
        })
        .collect();

    let results = pool.run(jobs, on_progress).await;

    // Zipping checksums every page; keep it off the async workers.
    let (results, archive) = tokio::task::spawn_blocking(move || {
        let archive = assemble(&results);
        (results, archive)
    })
    .await
    .map_err(|e| ZipError::Io(io::Error::other(format!("archive task failed: {}", e))))?;
    let archive = archive?;

    let failures: Vec<FailedItem> = results
        .into_iter()
        .filter_map(|settled| match settled {
            Settled::Success(_) => None,
            Settled::Failure {
                index,
                error: JobFailure { name, error },
            } => {
                warn!("batch: skipping '{}' (#{}): {}", name, index, error);
                Some(FailedItem { index, name, error })
            }
        })
        .collect();

    info!(
        "batch: {} of {} images archived in {:?}",
        archive.len(),
        total,
        start.elapsed()
    );

    Ok(BatchReport {
        archive,
        total,
        failures,
    })
}
