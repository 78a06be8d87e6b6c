//! TCP transport to the engine.

use tokio::net::TcpStream;

use crate::error::{MemstateError, Result};

/// Open a TCP connection to `host:port`.
///
/// Nagle's algorithm is disabled: requests are small and latency-bound.
///
/// # Errors
///
/// Returns [`MemstateError::Connect`] if the address cannot be reached.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addr = format!("{host}:{port}");
    tracing::debug!(%addr, "connecting");

    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| MemstateError::Connect {
            addr: addr.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;

    tracing::info!(%addr, "connected");
    Ok(stream)
}
