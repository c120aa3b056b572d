use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info};
use std::io;
use std::time::Duration;

use flat_drive::api::{configure, cors_headers};
use flat_drive::app_state::AppState;
use flat_drive::config::AppConfig;
use flat_drive::logging;
use flat_drive::service::telemetry::drain_telemetry;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = AppConfig::load()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    logging::init(&config.logging);
    config.log_summary();

    let (state, telemetry_worker) = AppState::from_config(config.clone()).map_err(|e| {
        error!("Failed to initialize application state: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;

    let server_config = config.server.clone();
    info!("Starting server on {}:{}", server_config.host, server_config.port);

    let data = web::Data::new(state);
    let app_data = data.clone();
    let max_payload_size = server_config.max_payload_size;

    HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .wrap(cors_headers())
            .wrap(Logger::default())
            .configure(configure)
    })
    .workers(server_config.workers)
    .bind((server_config.host.as_str(), server_config.port))?
    .run()
    .await?;

    // the server factory is gone; dropping the last state handle closes the telemetry queue
    drop(data);
    if let Some(worker) = telemetry_worker {
        drain_telemetry(worker, Duration::from_secs(config.telemetry.drain_timeout_secs)).await;
    }

    info!("Server stopped");
    Ok(())
}
