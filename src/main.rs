use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use flexibook::config::Config;
use flexibook::mailer::LogMailer;
use flexibook::meeting::MockMeetingLinks;
use flexibook::state::AppState;
use flexibook::store::Store;
use flexibook::{http, notify, observability, reaper, seed};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing();
    let config = Config::from_env();
    observability::init_metrics(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(Store::open(config.wal_path())?);
    if config.seed && seed::seed(&store).await? {
        info!("demo data loaded");
    }

    let meetings = Arc::new(MockMeetingLinks::new(config.meeting_base_url.clone()));
    let state = AppState::new(store.clone(), Arc::new(LogMailer), meetings, config.clone());

    tokio::spawn(reaper::run_reaper(store.clone()));
    tokio::spawn(reaper::run_compactor(store.clone(), config.compact_threshold));
    tokio::spawn(notify::run_dispatcher(state.clone()));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("flexibook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  public_url: {}", config.public_url);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("flexibook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM; axum then drains in-flight requests.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;
    info!("shutdown signal received");
}
