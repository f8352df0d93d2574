//! # Batch Service Module
//!
//! HTTP surface of the circular-crop pipeline, under `/api/batch`:
//!
//! - `POST /start`: multipart upload with an optional `settings` JSON part
//!   and one or more `file` parts. Schedules a background batch and returns
//!   `{"job_id": "..."}` right away.
//! - `GET /status/{job_id}`: current `JobStatus` of a batch.
//! - `GET /download/{job_id}`: the zip archive of a completed batch. The
//!   archive is handed out once and then dropped from memory.

mod download;
mod get_status;
mod start;

use actix_web::web::{get, post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/batch";

/// Configures and returns the Actix `Scope` for all batch routes.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/start", post().to(start::process))
        .route("/status/{job_id}", get().to(get_status::process))
        .route("/download/{job_id}", get().to(download::process))
}
