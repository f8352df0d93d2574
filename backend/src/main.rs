use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::info;
use roundprint::config::load_config;
use roundprint::job_controller::state::{start_job_janitor, start_job_updater, JobsState};
use roundprint::services;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = load_config();
    let address = config.bind_address();

    // Initialize job controller state
    let (jobs_state, rx) = JobsState::new(config.job_channel_capacity);

    // Start job updater task
    let updater_jobs = jobs_state.jobs.clone();
    tokio::spawn(async move {
        start_job_updater(updater_jobs, rx).await;
    });

    // Forget finished jobs nobody came back for
    tokio::spawn(start_job_janitor(
        jobs_state.clone(),
        config.job_retention(),
        config.janitor_interval(),
    ));

    info!("Server running at http://{}", address);

    let config_data = web::Data::new(config);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(jobs_state.clone()))
            .app_data(config_data.clone())
            .service(services::batch::configure_routes())
    })
    .bind(address)?
    .run()
    .await
}
