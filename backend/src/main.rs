mod archive;
mod config;
mod job_controller;
mod render;
mod services;
mod storage;

use actix_web::{App, HttpServer, web};
use env_logger::Env;
use log::info;

use crate::job_controller::state::JobsState;

fn startup_error(message: String) -> std::io::Error {
    std::io::Error::other(message)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    {
        let conn = storage::open().map_err(startup_error)?;
        storage::ensure_schema(&conn).map_err(startup_error)?;
    }

    // Initialize job controller state
    let (jobs_state, rx) = JobsState::new();

    // Start job updater task
    let updater_state = jobs_state.clone();
    tokio::spawn(async move {
        job_controller::state::start_job_updater(updater_state, rx).await;
    });

    // Evict finished jobs nobody downloaded
    let sweeper_state = jobs_state.clone();
    tokio::spawn(async move {
        job_controller::retention::start_retention_sweeper(sweeper_state, config::retention())
            .await;
    });

    let host = config::bind_host();
    let port = config::bind_port();
    info!("Server running at http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(10 * 1024 * 1024)) // 10 MB
            .app_data(web::Data::new(jobs_state.clone()))
            .service(services::templates::configure_routes())
            .service(services::batch::configure_routes())
    })
    .bind((host, port))?
    .run()
    .await
}
