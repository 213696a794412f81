use std::sync::Arc;

use anyhow::{Error, Result};
use notification_service::{
    api::{AppState, run_api_server},
    application::Application,
    clients::{
        database::DatabaseClient, directory::CloudDirectory, mail::HttpMailTransport,
        template::HttpTemplateResolver,
    },
    config::Config,
    queue::PostgresStorage,
    telemetry,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    telemetry::init(&config.log_format);

    info!("Configuration validated");

    let database = DatabaseClient::connect(&config).await?;
    database.migrate().await?;

    let app = Application::build(
        &config,
        Arc::new(PostgresStorage::new(database.pool())),
        Arc::new(CloudDirectory::new(&config)?),
        Arc::new(HttpTemplateResolver::new(&config)?),
        Arc::new(HttpMailTransport::new(&config)?),
    );

    let workers = app.start_workers();

    let state = Arc::new(AppState {
        health_checker: app.health_checker(),
        messages: app.messages.clone(),
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let served = run_api_server(state, config.server_port, shutdown).await;

    workers.shutdown().await;

    served
}
