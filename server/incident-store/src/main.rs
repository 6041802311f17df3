//! Binary entrypoint: load config, open the store, serve HTTP on 127.0.0.1.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::{error, info};

use incident_store::handlers::{self, AppState};
use incident_store::{Config, FileBackend, IncidentStore, ValidationRules};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "incident_store=info".into()),
    )
    .init();

  let config = Config::from_env()?;
  let backend = Arc::new(FileBackend::new(&config.data_path));
  let store = IncidentStore::new(&config, backend);
  store.initialize().await?;

  let state = Arc::new(AppState {
    store,
    rules: ValidationRules::default(),
  });

  let app = handlers::router(Arc::clone(&state)).layer(CorsLayer::permissive());

  let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
  info!(%addr, path = %config.data_path.display(), "incident-store listening");

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  // Anything still dirty (manual persistence, or a failed write) goes out now.
  if state.store.is_dirty().await? {
    if let Err(e) = state.store.flush().await {
      error!(error = %e, "final flush failed");
      return Err(e.into());
    }
    info!("flushed pending changes on shutdown");
  }

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(error = %e, "cannot listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}
