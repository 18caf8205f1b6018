pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod metrics_defs;
pub mod processor;
pub mod sheets;
pub mod table;

#[cfg(test)]
mod testutils;

use config::Config;
use credentials::GoogleConnector;
use errors::SplitterError;
use processor::{ProjectSelection, Processor, RunSummary};
use shared::admin_service::AdminService;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Serves the run API and the admin endpoints until either listener fails.
pub async fn run(config: Config) -> Result<(), ServeError> {
    let connector = GoogleConnector::new(&config)?;
    let listener = config.listener.clone();
    let admin_listener = config.admin_listener.clone();
    let processor = Arc::new(Processor::new(Arc::new(config), Arc::new(connector)));

    let admin_processor = processor.clone();
    let admin = AdminService::<_, ServeError>::new(move || admin_processor.readiness());

    tokio::try_join!(
        api::serve(&listener, processor),
        shared::http::run_http_service(&admin_listener.host, admin_listener.port, admin),
    )?;
    Ok(())
}

/// Performs a single run without starting any listener.
pub async fn run_once(
    config: Config,
    selection: ProjectSelection,
) -> Result<RunSummary, SplitterError> {
    let connector = GoogleConnector::new(&config)
        .map_err(|e| SplitterError::Unexpected(format!("could not build http client: {e}")))?;
    Processor::new(Arc::new(config), Arc::new(connector))
        .run(selection)
        .await
}
