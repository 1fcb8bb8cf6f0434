//! The auction bid ledger and auto-bid resolution engine: an append-only,
//! strictly ordered log of bidding events produced under per-lot mutual
//! exclusion, fanned out to live observers and replayable by late joiners.

pub mod api;
pub mod arguments;
pub mod database;
pub mod fanout;
pub mod finalizer;
pub mod locks;
pub mod resolution;
pub mod storage;
pub mod validation;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use {
    crate::api::AppState,
    std::{future::Future, net::SocketAddr, sync::Arc},
};

/// Serves the HTTP/WebSocket API until the shutdown signal resolves.
pub async fn serve_api(
    state: Arc<AppState>,
    address: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = api::handle_all_routes(state);
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "serving API");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
