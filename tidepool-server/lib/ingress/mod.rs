//! The ingress router for hostname-addressed sandboxes.
//!
//! Every accepted connection is handled by its own task. The router reads header lines until it
//! finds the `Host` line, resolves the routing key through the [`RouteTable`], dials the backend
//! and then relays bytes in both directions. The header bytes consumed while looking for the key
//! are sent to the backend first, so the backend sees the request unchanged.
//!
//! Connections that cannot be routed are answered with a fixed `400 Bad Request` and closed.

mod header;
mod pool;

use std::{io, sync::Arc, time::Duration};

use tidepool_core::management::RouteTable;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use header::*;
pub use pool::*;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The response sent to connections that cannot be routed.
pub const BAD_REQUEST_RESPONSE: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain\r\nContent-Length: 12\r\nConnection: close\r\n\r\nBad Request\n";

/// The size of each relay buffer.
const RELAY_BUFFER_SIZE: usize = 32 * 1024;

/// The number of relay buffers kept for reuse.
const MAX_IDLE_BUFFERS: usize = 256;

/// How long dialing a backend may take.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to back off after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Routes TCP connections to sandboxes by the `Host` header.
#[derive(Debug, Clone)]
pub struct IngressRouter {
    routes: Arc<RouteTable>,
    header_buffer_size: usize,
    buffers: Arc<BufferPool>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl IngressRouter {
    /// Creates a router resolving keys through `routes` and reading at most
    /// `header_buffer_size` header bytes per connection.
    pub fn new(routes: Arc<RouteTable>, header_buffer_size: usize) -> Self {
        Self {
            routes,
            header_buffer_size,
            buffers: BufferPool::new(RELAY_BUFFER_SIZE, MAX_IDLE_BUFFERS),
        }
    }

    /// Accepts connections forever, handling each on its own task.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        tracing::info!("ingress router listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("failed to accept ingress connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let router = self.clone();
            tokio::spawn(async move {
                if let Err(e) = router.handle(stream).await {
                    tracing::debug!("ingress connection from {} failed: {}", peer, e);
                }
            });
        }
    }

    /// Routes a single connection.
    pub async fn handle(&self, stream: TcpStream) -> io::Result<()> {
        let (client_read, mut client_write) = stream.into_split();
        let mut client_read = BufReader::new(client_read);

        let header = match read_routing_header(&mut client_read, self.header_buffer_size).await {
            Ok(header) => header,
            Err(HeaderError::Io(e)) => return Err(e),
            Err(e) => {
                tracing::debug!("rejecting ingress connection: {}", e);
                return reject(&mut client_write).await;
            }
        };

        let Some(addr) = self.routes.resolve(&header.key).await else {
            tracing::debug!("no route for {}", header.key);
            return reject(&mut client_write).await;
        };

        let backend = match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(backend)) => backend,
            Ok(Err(e)) => {
                tracing::warn!("failed to dial {} for {}: {}", addr, header.key, e);
                return reject(&mut client_write).await;
            }
            Err(_) => {
                tracing::warn!("timed out dialing {} for {}", addr, header.key);
                return reject(&mut client_write).await;
            }
        };

        tracing::debug!("relaying {} to {}", header.key, addr);

        let (backend_read, mut backend_write) = backend.into_split();
        backend_write.write_all(&header.consumed).await?;

        relay(
            client_read,
            client_write,
            backend_read,
            backend_write,
            &self.buffers,
        )
        .await;

        Ok(())
    }

    /// The route table this router resolves keys through.
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn reject<W: AsyncWrite + Unpin>(client: &mut W) -> io::Result<()> {
    client.write_all(BAD_REQUEST_RESPONSE).await?;
    client.shutdown().await
}

/// Copies bytes both ways until either direction ends, then tears down both.
async fn relay<CR, CW, BR, BW>(
    client_read: CR,
    client_write: CW,
    backend_read: BR,
    backend_write: BW,
    buffers: &Arc<BufferPool>,
) where
    CR: AsyncRead + Unpin + Send + 'static,
    CW: AsyncWrite + Unpin + Send + 'static,
    BR: AsyncRead + Unpin + Send + 'static,
    BW: AsyncWrite + Unpin + Send + 'static,
{
    let done = CancellationToken::new();

    let upstream = tokio::spawn(pump(client_read, backend_write, buffers.get(), done.clone()));
    let downstream = tokio::spawn(pump(backend_read, client_write, buffers.get(), done.clone()));

    let (up, down) = tokio::join!(upstream, downstream);
    match (up, down) {
        (Ok(up), Ok(down)) => tracing::debug!("relay finished: {} bytes up, {} bytes down", up, down),
        (up, down) => tracing::debug!("relay task failed: {:?} {:?}", up.err(), down.err()),
    }
}

/// Copies `from` into `to` until EOF, an error, or `done` is cancelled. Cancels `done` on exit.
async fn pump<R, W>(mut from: R, mut to: W, mut buffer: PooledBuffer, done: CancellationToken) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let _guard = done.clone().drop_guard();
    let mut total = 0u64;

    loop {
        let read = tokio::select! {
            _ = done.cancelled() => break,
            read = from.read(&mut buffer) => read,
        };

        let n = match read {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        let written = tokio::select! {
            _ = done.cancelled() => break,
            written = to.write_all(&buffer[..n]) => written,
        };

        if written.is_err() {
            break;
        }

        total += n as u64;
    }

    let _ = to.shutdown().await;
    total
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
