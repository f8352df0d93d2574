//! # Batch Start Service
//!
//! `POST /api/batch/start` receives the images of one batch and runs them
//! through the pipeline in the background.
//!
//! ## Workflow:
//!
//! 1.  **Upload**: the multipart body is read part by part. A `settings` part
//!     carries `BatchSettings` as JSON; every `file` part is one image. Parts
//!     whose content type is not `image/*` are skipped, the way the browser
//!     front end filters dropped files. The whole upload is capped at
//!     `maxUploadBytes`.
//!
//! 2.  **Validation**: settings fall back to the server's `defaultSettings`.
//!     Geometry and concurrency limit are checked here so that a bad request
//!     is answered with `400` instead of a failed job.
//!
//! 3.  **Job Scheduling**: a `job_id` is registered as `Pending` and returned
//!     to the client immediately. A Tokio task runs the batch.
//!
//! 4.  **Progress Reporting**: every settled image is forwarded to the central
//!     `job_controller` as `InProgress(percent)`. When the batch finishes the
//!     archive is stored for download and the job becomes `Completed` with a
//!     summary, or `Failed` if the batch itself failed.

use crate::config::ServerConfig;
use crate::job_controller::pool::TaskPool;
use crate::job_controller::state::{JobUpdate, JobsState};
use crate::pipeline::geometry::GeometryConfig;
use crate::pipeline::orchestrator::run_batch;
use crate::pipeline::transform::InputItem;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse, Responder};
use common::jobs::JobStatus;
use common::model::batch::BatchSettings;
use futures_util::StreamExt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum UploadError {
    #[error("upload exceeds the limit of {0} bytes")]
    TooLarge(usize),
    #[error("{0}")]
    Invalid(String),
}

/// Parts of the multipart body that matter to the pipeline.
struct Upload {
    settings: Option<BatchSettings>,
    items: Vec<InputItem>,
}

/// The Actix web handler for `POST /api/batch/start`.
///
/// # Arguments
/// * `state` - The shared `JobsState`, injected by Actix.
/// * `config` - Server configuration, for the upload cap and default settings.
/// * `payload` - The multipart body with `settings` and `file` parts.
///
/// # Returns
/// `200` with the `job_id`, `400` for invalid settings or no images, `413`
/// when the upload exceeds `maxUploadBytes`.
pub(crate) async fn process(
    state: web::Data<JobsState>,
    config: web::Data<ServerConfig>,
    payload: Multipart,
) -> impl Responder {
    let upload = match read_upload(payload, config.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(e @ UploadError::TooLarge(_)) => {
            return HttpResponse::PayloadTooLarge().body(e.to_string())
        }
        Err(e) => return HttpResponse::BadRequest().body(format!("Error: {}", e)),
    };

    let Some(settings) = upload
        .settings
        .or_else(|| config.default_settings.clone())
    else {
        return HttpResponse::BadRequest().body("Error: missing batch settings");
    };

    if let Err(e) = TaskPool::new(settings.concurrency_limit) {
        return HttpResponse::BadRequest().body(format!("Error: {}", e));
    }
    let geometry = match GeometryConfig::from_settings(&settings) {
        Ok(geometry) => geometry,
        Err(e) => return HttpResponse::BadRequest().body(format!("Error: {}", e)),
    };

    if upload.items.is_empty() {
        return HttpResponse::BadRequest().body("Error: no images supplied");
    }

    let job_id = schedule_batch_job(
        state,
        upload.items,
        geometry,
        settings.concurrency_limit,
    )
    .await;
    HttpResponse::Ok().json(serde_json::json!({ "job_id": job_id }))
}

/// Reads the `settings` and `file` parts of the request.
///
/// Parts are consumed in the order the client sent them. Non-image `file`
/// parts and parts with any other name are drained and dropped. A missing
/// filename becomes `image<N>`.
///
/// # Arguments
/// * `payload` - The multipart stream of the request.
/// * `max_bytes` - Cap on the summed size of every part that is kept.
///
/// # Returns
/// The parsed `Upload`, `UploadError::TooLarge` once the cap is crossed, or
/// `UploadError::Invalid` for a broken stream or unparsable settings.
async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<Upload, UploadError> {
    let mut settings = None;
    let mut items = Vec::new();
    let mut received = 0usize;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| UploadError::Invalid(e.to_string()))?;
        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));

        match field_name.as_deref() {
            Some("settings") => {
                let bytes = read_field(&mut field, &mut received, max_bytes).await?;
                let parsed: BatchSettings = serde_json::from_slice(&bytes)
                    .map_err(|e| UploadError::Invalid(format!("invalid settings: {}", e)))?;
                settings = Some(parsed);
            }
            Some("file") => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename().map(|f| f.to_string()))
                    .unwrap_or_else(|| format!("image{}", items.len() + 1));
                let is_image = field
                    .content_type()
                    .is_some_and(|mime| mime.essence_str().starts_with("image/"));

                if !is_image {
                    log::info!("Skipping '{}': not an image upload", filename);
                    skip_field(&mut field).await?;
                    continue;
                }

                let bytes = read_field(&mut field, &mut received, max_bytes).await?;
                items.push(InputItem::new(filename, bytes));
            }
            _ => skip_field(&mut field).await?,
        }
    }

    Ok(Upload { settings, items })
}

async fn read_field(
    field: &mut Field,
    received: &mut usize,
    max_bytes: usize,
) -> Result<Vec<u8>, UploadError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| UploadError::Invalid(e.to_string()))?;
        *received += chunk.len();
        if *received > max_bytes {
            return Err(UploadError::TooLarge(max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn skip_field(field: &mut Field) -> Result<(), UploadError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| UploadError::Invalid(e.to_string()))?;
    }
    Ok(())
}

/// Registers a new job and runs the batch in a background Tokio task.
///
/// The job is inserted as `Pending` before the task is spawned, so a client
/// polling right after the response never sees an unknown id. Progress goes
/// through the non-blocking `try_send`; the final status is awaited. The
/// archive is handed to `JobsState::finish` before the final status is sent.
///
/// # Arguments
/// * `state` - The application's shared `JobsState`.
/// * `items` - Images in upload order.
/// * `geometry` - Layout already validated by the caller.
/// * `limit` - Concurrency limit already validated by the caller.
///
/// # Returns
/// The `job_id` the client polls with.
async fn schedule_batch_job(
    state: web::Data<JobsState>,
    items: Vec<InputItem>,
    geometry: GeometryConfig,
    limit: usize,
) -> String {
    let job_id = Uuid::new_v4().to_string();
    state
        .jobs
        .write()
        .await
        .insert(job_id.clone(), JobStatus::Pending);
    log::info!("Scheduled batch {} with {} images", job_id, items.len());

    let state = state.get_ref().clone();
    let job_id_clone = job_id.clone();

    tokio::spawn(async move {
        let progress_tx = state.tx.clone();
        let progress_job_id = job_id_clone.clone();
        // The pool calls this synchronously, so updates are offered without
        // waiting. A dropped update is superseded by the next one.
        let on_progress = move |completed: usize, total: usize| {
            let update = JobUpdate::new(
                progress_job_id.clone(),
                JobStatus::progress(completed, total),
            );
            if let Err(e) = progress_tx.try_send(update) {
                log::debug!("Dropped progress update for {}: {}", progress_job_id, e);
            }
        };

        let (status, archive) = match run_batch(items, geometry, limit, on_progress).await {
            Ok(report) => (JobStatus::Completed(report.summary()), Some(report.archive)),
            Err(e) => {
                log::error!("Batch {} failed: {}", job_id_clone, e);
                (JobStatus::Failed(e.to_string()), None)
            }
        };

        state.finish(&job_id_clone, archive).await;

        // Send the final status to the central job controller.
        if let Err(e) = state.tx.send(JobUpdate::new(job_id_clone.clone(), status)).await {
            log::error!("Failed to publish final status of batch {}: {}", job_id_clone, e);
        }
    });

    job_id
}
