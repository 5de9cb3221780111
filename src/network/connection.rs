//! Native session connection loop.
//!
//! One task per connection, a `tokio::select!` over inbound frames, the
//! session's outbound queue, the hub kill signal and process shutdown.
//! Inbound events are processed sequentially in arrival order.

use crate::dispatch::{Dispatcher, Flow};
use crate::hub::{SessionHandle, SessionKind};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Run one native session to completion.
pub async fn run_native_session(
    ws: WebSocketStream<TcpStream>,
    ip: String,
    dispatcher: Arc<Dispatcher>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let session_id = Uuid::new_v4().to_string();
    let (handle, mut outbound_rx) =
        SessionHandle::new(session_id.clone(), SessionKind::Native, ip.clone());
    dispatcher.hub.register(Arc::clone(&handle));
    info!(session = %session_id, %ip, "Client connected");

    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(raw))) => {
                    if dispatcher.handle_raw(&handle, &raw) == Flow::Disconnect {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Binary and control frames carry nothing for us.
                }
                Some(Err(e)) => {
                    debug!(session = %session_id, error = %e, "Read error");
                    break;
                }
            },

            outbound = outbound_rx.recv() => match outbound {
                Some(event) => match event.encode() {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "Outbound encode failed");
                    }
                },
                None => break,
            },

            _ = handle.kill.notified() => {
                debug!(session = %session_id, "Session killed by hub");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            _ = shutdown_rx.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    dispatcher.disconnect(&handle);
    info!(session = %session_id, "Client disconnected");
}
