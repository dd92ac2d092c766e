//! WebSocket client transport.
//!
//! Connects to a browser's DevTools endpoint and spawns an I/O task that
//! handles:
//!
//! - Outgoing text frames queued through [`Transport::send`]
//! - Incoming text frames, forwarded in arrival order to the inbound channel
//! - Shutdown on close, error, or explicit [`Transport::close`]

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::Transport;

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the I/O task.
enum TransportCommand {
    /// Write one text frame.
    Send(String),
    /// Close the socket and stop.
    Shutdown,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket transport to a DevTools endpoint.
///
/// Cloning shares the same underlying socket.
#[derive(Clone)]
pub struct WebSocketTransport {
    /// Channel for sending commands to the I/O task.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Endpoint this transport is connected to.
    url: Url,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url.as_str())
            .field("closed", &self.command_tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Connects to a `ws://` or `wss://` endpoint.
    ///
    /// Returns the transport and the channel inbound text frames arrive on.
    /// The channel ends when the socket closes.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is malformed or not a WebSocket URL
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let url = Self::validate_url(url)?;

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        debug!(url = %url, "WebSocket connected");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_io_loop(ws_stream, command_rx, inbound_tx));

        Ok((Self { command_tx, url }, inbound_rx))
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Parses and checks the endpoint URL.
    fn validate_url(url: &str) -> Result<Url> {
        let parsed =
            Url::parse(url).map_err(|e| Error::config(format!("Invalid endpoint URL {url}: {e}")))?;

        match parsed.scheme() {
            "ws" | "wss" => Ok(parsed),
            scheme => Err(Error::config(format!(
                "Unsupported endpoint scheme '{scheme}', expected ws or wss"
            ))),
        }
    }

    /// I/O loop that owns the socket.
    async fn run_io_loop(
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        inbound_tx: mpsc::UnboundedSender<String>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            if inbound_tx.send(text.to_string()).is_err() {
                                debug!("Inbound receiver dropped");
                                break;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Frames queued by the connection
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(error = %e, "Failed to write frame");
                                break;
                            }
                        }

                        Some(TransportCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        debug!("Transport I/O loop terminated");
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, text: String) -> Result<()> {
        self.command_tx
            .send(TransportCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown);
    }
}

// ============================================================================
// Tests
// ============================================================================
