//! HTTP transport for the registry
//!
//! The server side is an axum [`Router`](axum::Router) over a
//! [`SchemaRegistry`]; the client side is [`RegistryClient`], which doubles
//! as a [`SchemaSource`](crate::source::SchemaSource) for consumers.

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::Result;
use crate::registry::SchemaRegistry;

mod client;
mod routes;
pub mod wire;

pub use client::RegistryClient;
pub use routes::{registry_routes, status_for, ApiError, MAX_REQUEST_BYTES};

/// Serve the registry API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, registry: SchemaRegistry, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Schema registry listening");

    axum::serve(listener, registry_routes(registry))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Schema registry stopped");
    Ok(())
}
