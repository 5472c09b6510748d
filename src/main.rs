use queueview::api;
use queueview::config;
use queueview::estimation::WaitTimeEstimator;
use queueview::poller::Poller;
use queueview::state::AppState;
use queueview::store::DocumentStore;
use queueview::store::couchdb::CouchDbStore;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_from_env()?;
    init_tracing(&config.logging.level);
    tracing::info!(app = %config.app.name, "queueview starting");

    let store = CouchDbStore::from_config(&config)?;
    tracing::info!(endpoint = store.endpoint(), "Document store configured");
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let state = Arc::new(RwLock::new(AppState::new()));
    let poller = Poller::new(
        store,
        WaitTimeEstimator::new(config.estimator_config()),
        Arc::clone(&state),
        config.poll_interval(),
        config.window_duration(),
    );
    let handle = poller.spawn();

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    handle.stop().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
