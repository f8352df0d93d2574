use actix_web::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::jobs::JobStatus;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use roundprint::config::ServerConfig;
use roundprint::job_controller::state::{start_job_updater, JobsState};
use roundprint::services::batch::configure_routes;
use std::io::{Cursor, Read};
use std::time::Duration;

const BOUNDARY: &str = "roundprint-test-boundary";
const SETTINGS: &str = r#"{"dpi":25.4,"pageWidthMm":40,"pageHeightMm":50,"outerDiameterMm":30,"borderThicknessMm":1,"concurrencyLimit":2}"#;

fn png(color: [u8; 3]) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb(color)))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart_body(settings: Option<&str>, files: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(json) = settings {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"settings\"\r\nContent-Type: application/json\r\n\r\n{}\r\n",
                BOUNDARY, json
            )
            .as_bytes(),
        );
    }
    for (filename, mime, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, filename, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn start_request(body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/batch/start")
        .insert_header((
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
}

fn jobs_state() -> JobsState {
    let (state, rx) = JobsState::new(16);
    tokio::spawn(start_job_updater(state.jobs.clone(), rx));
    state
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .app_data(web::Data::new(ServerConfig::default()))
                .service(configure_routes()),
        )
        .await
    };
}

#[actix_web::test]
async fn batch_runs_to_a_downloadable_archive() {
    let state = jobs_state();
    let app = app!(state);

    let body = multipart_body(
        Some(SETTINGS),
        &[
            ("red.jpg", "image/jpeg", png([255, 0, 0])),
            ("bad.png", "image/png", b"not really a png".to_vec()),
            ("notes.txt", "text/plain", b"ignored".to_vec()),
            ("blue", "image/png", png([0, 0, 255])),
        ],
    );
    let started: serde_json::Value =
        test::call_and_read_body_json(&app, start_request(body).to_request()).await;
    let job_id = started["job_id"].as_str().unwrap().to_string();

    let mut status = JobStatus::Pending;
    for _ in 0..500 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/batch/status/{}", job_id))
            .to_request();
        status = test::call_and_read_body_json(&app, req).await;
        if status.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        status,
        JobStatus::Completed("Processed 2 of 3 images (failed: bad.png)".to_string())
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/batch/download/{}", job_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/zip");
    assert_eq!(
        resp.headers().get(CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"modified_images.zip\""
    );
    let bytes = test::read_body(resp).await;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        let page = image::load_from_memory(&content).unwrap();
        assert_eq!((page.width(), page.height()), (40, 50));
        names.push(entry.name().to_string());
    }
    assert_eq!(names, vec!["modified_red.png", "modified_blue.png"]);

    // Archives are handed out once.
    let req = test::TestRequest::get()
        .uri(&format!("/api/batch/download/{}", job_id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn missing_settings_is_a_bad_request() {
    let state = jobs_state();
    let app = app!(state);

    let body = multipart_body(None, &[("a.png", "image/png", png([1, 2, 3]))]);
    let resp = test::call_service(&app, start_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(state.jobs.read().await.is_empty());
}

#[actix_web::test]
async fn request_without_images_is_rejected() {
    let state = jobs_state();
    let app = app!(state);

    let body = multipart_body(Some(SETTINGS), &[("notes.txt", "text/plain", b"hi".to_vec())]);
    let resp = test::call_service(&app, start_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn zero_concurrency_limit_is_rejected_before_scheduling() {
    let state = jobs_state();
    let app = app!(state);

    let settings = SETTINGS.replace("\"concurrencyLimit\":2", "\"concurrencyLimit\":0");
    let body = multipart_body(Some(&settings), &[("a.png", "image/png", png([1, 2, 3]))]);
    let resp = test::call_service(&app, start_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(state.jobs.read().await.is_empty());
}

#[actix_web::test]
async fn unknown_job_is_not_found() {
    let state = jobs_state();
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/batch/status/does-not-exist")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri("/api/batch/download/does-not-exist")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn uploaded_paths_are_flattened_in_the_archive() {
    let state = jobs_state();
    let app = app!(state);

    let body = multipart_body(
        Some(SETTINGS),
        &[("x/../../evil.jpg", "image/png", png([0, 255, 0]))],
    );
    let started: serde_json::Value =
        test::call_and_read_body_json(&app, start_request(body).to_request()).await;
    let job_id = started["job_id"].as_str().unwrap().to_string();

    for _ in 0..500 {
        if state.status(&job_id).await.is_some_and(|s| s.is_finished()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let req = test::TestRequest::get()
        .uri(&format!("/api/batch/download/{}", job_id))
        .to_request();
    let bytes = test::call_and_read_body(&app, req).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.by_index(0).unwrap().name(), "modified_evil.png");
}

#[actix_web::test]
async fn oversized_geometry_is_a_bad_request() {
    let state = jobs_state();
    let app = app!(state);

    let settings = r#"{"dpi":1e7,"pageWidthMm":210,"pageHeightMm":297,"outerDiameterMm":1,"concurrencyLimit":1}"#;
    let body = multipart_body(Some(settings), &[("a.png", "image/png", png([1, 2, 3]))]);
    let resp = test::call_service(&app, start_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(state.jobs.read().await.is_empty());
}
