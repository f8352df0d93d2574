use crate::job_controller::state::JobsState;
use crate::pipeline::archive::ARCHIVE_FILE_NAME;
use actix_web::http::header::CONTENT_DISPOSITION;
use actix_web::{web, HttpResponse, Responder};

/// Serves the archive of a completed batch as a zip attachment.
///
/// - `200`: archive bytes; the archive is removed from the registry.
/// - `409`: the batch is still pending or running.
/// - `404`: unknown job, failed batch, or archive already downloaded.
pub(crate) async fn process(job_id: web::Path<String>, state: web::Data<JobsState>) -> impl Responder {
    let job_id = job_id.into_inner();

    if let Some(archive) = state.take_archive(&job_id).await {
        log::info!(
            "Serving archive for job {} ({} entries)",
            job_id,
            archive.len()
        );
        return HttpResponse::Ok()
            .content_type("application/zip")
            .insert_header((
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", ARCHIVE_FILE_NAME),
            ))
            .body(archive.into_bytes());
    }

    match state.status(&job_id).await {
        Some(status) if !status.is_finished() => {
            HttpResponse::Conflict().body("Batch is still being processed")
        }
        Some(_) => HttpResponse::NotFound().body("No archive available for this job"),
        None => HttpResponse::NotFound().body("Job ID not found"),
    }
}
