//! Northbound WebSocket transport glue.
//!
//! The mapper core consumes and produces text frames; this module wires
//! those frames onto a WebSocket connection owned by an external
//! server. One client connection drives one [`MapperSession`].
//!
//! The southbound counterpart, [`WebSocketPipe`], implements
//! [`CdpPipe`] over a client connection to the browser's DevTools
//! endpoint.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::cdp::connection::CdpPipe;
use crate::error::{Error, Result};
use crate::mapper::MapperSession;

// ============================================================================
// Client Serving
// ============================================================================

/// Pumps one accepted client WebSocket against a mapper session until
/// either side goes away. Ends the session on disconnect.
pub async fn serve_client(
    ws_stream: WebSocketStream<TcpStream>,
    session: Arc<MapperSession>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        session.handle_frame(&text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Client WebSocket error");
                        break;
                    }
                    // Binary, Ping, Pong are not part of the protocol.
                    _ => {}
                }
            }

            frame = outgoing.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            warn!(error = %e, "Client send failed");
                            break;
                        }
                    }
                    None => {
                        debug!("Outgoing queue closed");
                        break;
                    }
                }
            }
        }
    }

    session.end();
    let _ = ws_write.close().await;
}

// ============================================================================
// WebSocketPipe
// ============================================================================

/// A [`CdpPipe`] over a WebSocket connection to the browser.
pub struct WebSocketPipe {
    write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WebSocketPipe {
    /// Connects to the browser's DevTools WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns `session not created` when the connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::session_not_created(format!("CDP connect failed: {e}")))?;
        debug!(url, "CDP WebSocket connected");

        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }
}

#[async_trait]
impl CdpPipe for WebSocketPipe {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.write
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| Error::cdp(format!("CDP send failed: {e}")))
    }

    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "CDP WebSocket error");
                    return None;
                }
            }
        }
    }
}
