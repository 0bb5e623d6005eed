//! Server entry point: wires the lifecycle controller, the control plane and the ingress router.

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use tidepool_core::{
    management::{AddressingMode, Lifecycle},
    runtime::ContainerRuntime,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::{ingress::IngressRouter, route, state::AppState, Config, ServerResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs the server until Ctrl-C.
///
/// On startup the port pool and the route table are rebuilt from the sandboxes the runtime
/// already knows about. The ingress router only runs in hostname addressing mode.
pub async fn run(config: Config, runtime: Arc<dyn ContainerRuntime>) -> ServerResult<()> {
    let lifecycle = Arc::new(Lifecycle::new(
        runtime,
        config.port_pool()?,
        config.lifecycle_settings(),
    ));

    let found = lifecycle.resync().await?;
    tracing::info!("resynced with {} existing sandboxes", found);

    let ingress = match config.get_addressing() {
        AddressingMode::Hostname => {
            let listener = TcpListener::bind(config.get_ingress_addr()).await?;
            let router = IngressRouter::new(lifecycle.routes(), *config.get_header_buffer_size());
            Some(tokio::spawn(router.serve(listener)))
        }
        AddressingMode::Port => None,
    };

    let control = TcpListener::bind(config.get_listen_addr()).await?;
    tracing::info!(
        "control plane listening on {} ({} addressing)",
        control.local_addr()?,
        config.get_addressing()
    );

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    let state = AppState::new(Arc::new(config), lifecycle);
    let app = route::create_router(state).layer(cors);

    axum::serve(control, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(ingress) = ingress {
        ingress.abort();
    }

    tracing::info!("server stopped");
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
