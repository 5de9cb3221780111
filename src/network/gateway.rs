//! Gateway - the shared TCP listener.
//!
//! Every connection is peeked for its HTTP request head first: WebSocket
//! upgrades become native or classical-wire sessions depending on path,
//! `GET /healthz` answers the health probe, and anything else is a 404.

use super::connection::run_native_session;
use super::http::{
    self, RequestHead, find_head_end, forbidden_response, healthz_response, not_found_response,
};
use super::origin;
use crate::dispatch::Dispatcher;
use crate::wire::run_wire_session;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Maximum request-head size accepted on the shared socket.
const MAX_HEAD_BYTES: usize = 8_192;

/// How long to wait for a complete request head.
const HEAD_TIMEOUT: Duration = Duration::from_secs(5);

/// The Gateway accepts incoming TCP connections and spawns session tasks.
pub struct Gateway {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        addr: &str,
        dispatcher: Arc<Dispatcher>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Gateway listening");
        Ok(Self {
            listener,
            dispatcher,
            shutdown_tx,
        })
    }

    /// The locally bound address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown is signalled.
    pub async fn run(self) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "Connection accepted");
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let shutdown_rx = self.shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            if let Err(e) = handle_socket(stream, addr, dispatcher, shutdown_rx).await {
                                debug!(%addr, error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Gateway stopped accepting connections");
                    return Ok(());
                }
            }
        }
    }
}

/// Peek the request head and route the socket.
async fn handle_socket(
    mut stream: TcpStream,
    addr: std::net::SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (head, head_len) = match peek_head(&stream).await? {
        Some(parsed) => parsed,
        None => {
            // Never sent a parseable head; drop the socket quietly.
            return Ok(());
        }
    };

    if !head.is_websocket_upgrade() {
        // Plain HTTP: consume the head we peeked, answer and close.
        let mut sink = vec![0u8; head_len];
        stream.read_exact(&mut sink).await?;
        let response = if head.method == "GET" && head.route() == "/healthz" {
            healthz_response()
        } else {
            not_found_response()
        };
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;
        return Ok(());
    }

    let allowed = origin::origin_allowed(
        head.header("origin"),
        &dispatcher.config.allowed_origins,
    );
    if !allowed {
        warn!(%addr, origin = ?head.header("origin"), "Origin rejected");
        stream.write_all(forbidden_response().as_bytes()).await?;
        stream.shutdown().await?;
        return Ok(());
    }

    let ip = origin::client_ip(addr.ip(), &head);
    let route = head.route().to_string();
    let ws = tokio_tungstenite::accept_async(stream).await?;

    match route.as_str() {
        "/webirc" => run_wire_session(ws, ip, dispatcher, shutdown_rx).await,
        _ => run_native_session(ws, ip, dispatcher, shutdown_rx).await,
    }
    Ok(())
}

/// Peek until a full request head is buffered (bounded in size and time).
async fn peek_head(stream: &TcpStream) -> std::io::Result<Option<(RequestHead, usize)>> {
    let mut buf = vec![0u8; MAX_HEAD_BYTES];
    let deadline = tokio::time::Instant::now() + HEAD_TIMEOUT;

    loop {
        let n = stream.peek(&mut buf).await?;
        if let Some(end) = find_head_end(&buf[..n]) {
            return Ok(http::parse_head(&buf[..end]).map(|head| (head, end)));
        }
        if n == buf.len() || tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        // Partial head buffered; give the client a moment to finish it.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
