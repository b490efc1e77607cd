//! WebSocket signaling transport.
//!
//! Opens the control socket and splits it into two pump tasks:
//! - writer: drains the outbound queue into the socket
//! - reader: turns socket frames into [`TransportFrame`]s
//!
//! The transport knows nothing about message contents; parsing happens in
//! the channel.

use std::fmt::Display;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Result, SessionError};

/// Frame delivered by a transport link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    /// Remote or network close. Carries the close reason when one was given.
    Closed(Option<String>),
    Error(String),
}

/// Frame queued for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// An open connection: a send queue and a frame stream
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportFrame>,
}

/// Opens signaling connections.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn open(&self, url: &str, subprotocol: Option<&str>) -> Result<TransportLink>;
}

/// tokio-tungstenite transport
#[derive(Default)]
pub struct WebSocketTransport;

#[async_trait]
impl SignalingTransport for WebSocketTransport {
    async fn open(&self, url: &str, subprotocol: Option<&str>) -> Result<TransportLink> {
        let mut request = url
            .into_client_request()
            .map_err(|e| SessionError::Signaling(format!("invalid signaling URL: {}", e)))?;

        if let Some(protocol) = subprotocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| SessionError::Signaling(format!("invalid subprotocol: {}", e)))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::Signaling(format!("failed to connect to signaling server: {}", e)))?;

        info!("Connected to signaling server: {}", url);

        let (ws_sender, mut ws_receiver) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportFrame>();

        tokio::spawn(pump_outbound(ws_sender, out_rx, in_tx.clone()));

        // Reader
        tokio::spawn(async move {
            loop {
                let frame = match ws_receiver.next().await {
                    Some(Ok(Message::Text(text))) => TransportFrame::Text(text),
                    Some(Ok(Message::Close(close))) => {
                        let reason = close.map(|c| c.reason.to_string()).filter(|r| !r.is_empty());
                        let _ = in_tx.send(TransportFrame::Closed(reason));
                        break;
                    }
                    // Ping/pong handled by tungstenite, binary unused
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = in_tx.send(TransportFrame::Error(e.to_string()));
                        let _ = in_tx.send(TransportFrame::Closed(None));
                        break;
                    }
                    None => {
                        let _ = in_tx.send(TransportFrame::Closed(None));
                        break;
                    }
                };
                if in_tx.send(frame).is_err() {
                    break;
                }
            }
            debug!("Signaling reader stopped");
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Drain the outbound queue into the socket.
///
/// A failed write is reported on the inbound side as an error followed by
/// a close, so the channel learns the link is gone.
async fn pump_outbound<S>(
    mut ws_sender: S,
    mut out_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    in_tx: mpsc::UnboundedSender<TransportFrame>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(frame) = out_rx.recv().await {
        let (msg, last) = match frame {
            OutboundFrame::Text(text) => (Message::Text(text), false),
            OutboundFrame::Close => (Message::Close(None), true),
        };
        if let Err(e) = ws_sender.send(msg).await {
            warn!("Signaling send failed: {}", e);
            let _ = in_tx.send(TransportFrame::Error(format!("send failed: {}", e)));
            let _ = in_tx.send(TransportFrame::Closed(None));
            break;
        }
        if last {
            break;
        }
    }
    debug!("Signaling writer stopped");
}
