//! Listen socket and graceful shutdown (design doc §2.9/§5). SIGINT and
//! SIGTERM both close the listen socket, let in-flight handlers finish,
//! drain the target-store connection pools, and exit 0; any uncaught
//! startup failure exits non-zero (§6).

use axum::Router;
use socketioxide::SocketIo;
use tokio::net::TcpListener;

use crate::app_state::AppState;
use crate::config::Config;
use crate::error::ServerResult;
use crate::session_controller;

/// Build the `axum` router with the Socket.IO layer mounted, tuned with
/// the transport parameters from `state.config.transport`.
pub fn build_router(state: AppState) -> Router {
    let (layer, io) = SocketIo::builder()
        .ping_interval(state.config.transport.ping_interval)
        .ping_timeout(state.config.transport.ping_timeout)
        .connect_timeout(state.config.transport.upgrade_timeout)
        .max_payload(state.config.transport.max_buffer_size as u64)
        .build_layer();

    session_controller::register(&io, state);

    Router::new()
        .layer(layer)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Bind the listen socket and serve until a shutdown signal arrives,
/// then drain the target store's pools before returning.
pub async fn run(config: Config, state: AppState) -> ServerResult<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let router = build_router(state.clone());

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("draining target-store connection pools");
    state.store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
