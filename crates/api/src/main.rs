//! Storefront edge API server

use anyhow::Context;
use tokio::{signal, sync::watch};
use tracing::info;

use storefront_api::{
    routes::{create_internal_router, create_router},
    telemetry, AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing("storefront_api=info,tower_http=info");

    let config = Config::from_env().context("Invalid configuration")?;
    let bind_address = config.bind_address.clone();
    let internal_bind_address = config.internal_bind_address.clone();
    info!(
        main_domain = %config.main_domain,
        ingress_ip = %config.ingress_ip,
        directory = %config.directory_url,
        "Starting storefront edge"
    );

    let state = AppState::from_config(config)?;
    let app = create_router(state.clone());
    let internal_app = create_internal_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!(address = %bind_address, "Listening");

    let internal_listener = tokio::net::TcpListener::bind(&internal_bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", internal_bind_address))?;
    info!(address = %internal_bind_address, "Internal listener ready");

    // One signal stops both listeners
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    let public = axum::serve(listener, app).with_graceful_shutdown(shutdown(shutdown_rx.clone()));
    let internal =
        axum::serve(internal_listener, internal_app).with_graceful_shutdown(shutdown(shutdown_rx));

    tokio::try_join!(
        async { public.await.context("Server error") },
        async { internal.await.context("Internal server error") },
    )?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown(mut rx: watch::Receiver<()>) {
    let _ = rx.changed().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
