use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::dispatch::dispatch;
use crate::framer::{self, FrameError};
use crate::http::Response;
use crate::registry::EndpointRegistry;
use crate::status::StatusCode;

/// OS-level accept backlog; connections beyond it queue in the kernel.
pub const DEFAULT_BACKLOG: u32 = 10;
/// Default cap on a single request-response exchange, so a client that
/// never completes its headers or body cannot starve the serial loop.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// The connection loop.
///
/// Processing is fully serial: one connection is accepted, framed,
/// dispatched, answered and closed before the next accept. The registry
/// must be fully populated before [`Server::serve`] is called.
pub struct Server {
    listener: TcpListener,
    registry: EndpointRegistry,
    exchange_timeout: Duration,
}

impl Server {
    /// Bind the listener. The address may be a hostname; the first
    /// resolved address is used. Failure here is fatal at startup.
    pub fn bind(address: &str, port: u16, registry: EndpointRegistry) -> io::Result<Server> {
        let addr: SocketAddr = (address, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for '{address}'"),
            )
        })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(DEFAULT_BACKLOG)?;

        Ok(Server {
            listener,
            registry,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        })
    }

    /// Override the per-exchange deadline.
    pub fn set_exchange_timeout(&mut self, limit: Duration) {
        self.exchange_timeout = limit;
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Serve connections one at a time until the shutdown signal flips to
    /// `true`. The signal is observed even while blocked in accept.
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        self.handle_connection(stream, peer).await;
                    }
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown signal received, stopping server");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        info!(%peer, "accepted connection");
        let started = Instant::now();

        let exchange = timeout(self.exchange_timeout, self.exchange(&mut stream));

        match exchange.await {
            Ok(Ok(status)) => info!(
                %peer,
                status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request finished"
            ),
            // Socket-level failure: abandon this connection, keep serving.
            Ok(Err(err)) => error!(%peer, error = %err, "connection failed"),
            Err(_) => {
                warn!(%peer, "connection timed out");
                let response =
                    Response::with_body(StatusCode::REQUEST_TIMEOUT, "Request timeout");
                let _ = stream.write_all(response.to_wire().as_bytes()).await;
            }
        }
        // The stream drops here, closing the connection.
    }

    /// Frame exactly one request, dispatch it, write the response.
    async fn exchange(&self, stream: &mut TcpStream) -> io::Result<u16> {
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half);

        let response = match framer::read_request(&mut reader).await {
            Ok(request) => dispatch(&self.registry, request),
            // Framing failures skip dispatch and answer directly.
            Err(FrameError::Invalid { status, message }) => Response::with_body(status, message),
            Err(FrameError::Io(err)) => return Err(err),
        };

        let status = response.status().code();
        write_half.write_all(response.to_wire().as_bytes()).await?;
        write_half.shutdown().await?;

        Ok(status)
    }
}
