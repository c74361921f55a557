//! HTTP surface of the document question-answering backend.

mod core;
mod error_handler;
mod middleware_layer;
mod routes;

use std::sync::Arc;

use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

pub use crate::error_handler::AppError;

use crate::core::app_state::{AppState, api_address};

/// Builds the state from env, binds `API_ADDRESS` and serves until Ctrl+C.
pub async fn start() -> Result<(), AppError> {
    let addr = api_address()?;
    let state = Arc::new(AppState::from_env().await?);
    let app = routes::router(state);

    let listener = TcpListener::bind(addr).await.map_err(AppError::Bind)?;
    info!(%addr, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("api stopped");
    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
