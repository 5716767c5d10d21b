//! GraphQL-over-WebSocket transport (graphql-transport-ws) with restart.
//!
//! Connections are opened lazily: one per subscription, and one per
//! operation when a client is `websocketsOnly`. Connection params are
//! re-resolved through the params callback on every (re)connect, since a
//! socket can outlive any single token's validity window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use graphmux_core::{ClientError, GraphqlRequest, GraphqlResponse, WsLinkOptions};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback producing the `connection_init` payload, invoked on every
/// (re)connect attempt.
pub type ConnectionParams = Arc<dyn Fn() -> Option<serde_json::Value> + Send + Sync>;

/// Stream of subscription results.
pub type SubscriptionStream =
    ReceiverStream<Result<GraphqlResponse<serde_json::Value>, ClientError>>;

/// Wire messages of the graphql-transport-ws protocol.
#[derive(Debug, Serialize, Deserialize)]
struct GraphqlWsMessage {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
}

/// WebSocket transport that can be torn down and reopened on demand.
///
/// `restart()` never reconnects in place: it signals every live connection
/// to close and re-handshake with freshly resolved connection params.
/// Signalling goes through a watch channel, so restarts requested while one
/// is pending collapse into a single reconnect.
pub struct RestartableTransport {
    url: String,
    options: WsLinkOptions,
    params: ConnectionParams,
    restart_tx: watch::Sender<u64>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RestartableTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartableTransport")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RestartableTransport {
    /// Create the transport. No socket is opened until first use.
    #[must_use]
    pub fn new(url: impl Into<String>, options: WsLinkOptions, params: ConnectionParams) -> Self {
        let (restart_tx, _) = watch::channel(0);
        Self {
            url: url.into(),
            options,
            params,
            restart_tx,
            next_id: AtomicU64::new(1),
        }
    }

    /// Endpoint this transport connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Tear down and reopen every live connection.
    ///
    /// Safe to call repeatedly; rapid successive restarts produce one
    /// reconnect per live connection, not several.
    pub fn restart(&self) {
        self.restart_tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    fn connect_timeout(&self) -> Duration {
        self.options
            .connect_timeout_secs
            .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs)
    }

    fn ack_timeout(&self) -> Duration {
        self.options
            .ack_timeout_secs
            .map_or(DEFAULT_ACK_TIMEOUT, Duration::from_secs)
    }

    /// Open a connection and run the `connection_init`/`connection_ack`
    /// handshake with freshly resolved params.
    async fn connect(&self) -> Result<WsSession, ClientError> {
        let url =
            Url::parse(&self.url).map_err(|err| ClientError::protocol(err.to_string()))?;

        let connected =
            tokio::time::timeout(self.connect_timeout(), connect_async(url.as_str()))
                .await
                .map_err(|_| ClientError::protocol("websocket connect timeout"))?;
        let (stream, _response) =
            connected.map_err(|err| ClientError::protocol(format!("websocket connect failed: {err}")))?;
        let mut session = WsSession::new(stream);

        session
            .send_json(&GraphqlWsMessage {
                message_type: "connection_init".to_string(),
                id: None,
                payload: (self.params)(),
            })
            .await?;

        let ack = tokio::time::timeout(self.ack_timeout(), session.recv_data()).await;
        match ack {
            Ok(Ok(Some(message))) => {
                if message.message_type != "connection_ack" {
                    return Err(ClientError::protocol(format!(
                        "expected connection_ack, got {}",
                        message.message_type
                    )));
                }
            }
            Ok(Ok(None)) => {
                return Err(ClientError::protocol("connection closed before ack"));
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(ClientError::protocol("connection_ack timeout")),
        }

        Ok(session)
    }

    /// Connect and send the `subscribe` frame for one operation.
    async fn start(&self, request: &GraphqlRequest) -> Result<(WsSession, String), ClientError> {
        let mut session = self.connect().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        session
            .send_json(&GraphqlWsMessage {
                message_type: "subscribe".to_string(),
                id: Some(id.clone()),
                payload: Some(request.body()),
            })
            .await?;
        Ok((session, id))
    }

    /// Dispatch a query or mutation over the socket and wait for its single
    /// result. Used when a client is `websocketsOnly`.
    pub async fn execute(
        &self,
        request: &GraphqlRequest,
    ) -> Result<GraphqlResponse<serde_json::Value>, ClientError> {
        let (mut session, _id) = self.start(request).await?;
        loop {
            let Some(message) = session.recv_data().await? else {
                return Err(ClientError::protocol("connection closed before a result"));
            };
            match message.message_type.as_str() {
                "next" => {
                    let payload = message
                        .payload
                        .ok_or_else(|| ClientError::protocol("next frame without payload"))?;
                    let response = serde_json::from_value(payload)?;
                    let _ = session.close().await;
                    return Ok(response);
                }
                "error" => return Err(ClientError::graphql(decode_errors(message.payload))),
                "complete" => {
                    return Err(ClientError::protocol("operation completed without a result"))
                }
                "ping" => session.send_pong(message).await?,
                other => {
                    return Err(ClientError::protocol(format!(
                        "unexpected websocket message: {other}"
                    )))
                }
            }
        }
    }

    /// Open a subscription. The stream stays live across `restart()`:
    /// the task closes its socket, re-handshakes, and re-subscribes.
    pub async fn subscribe(
        self: Arc<Self>,
        request: GraphqlRequest,
    ) -> Result<SubscriptionStream, ClientError> {
        let (mut session, mut id) = self.start(&request).await?;
        let mut restart_rx = self.restart_tx.subscribe();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = restart_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        debug!(url = self.url.as_str(), "restarting websocket connection");
                        let _ = session.close().await;
                        match self.start(&request).await {
                            Ok((next, next_id)) => {
                                session = next;
                                id = next_id;
                            }
                            Err(err) => {
                                let _ = tx.send(Err(err)).await;
                                break;
                            }
                        }
                    }
                    message = session.recv_data() => {
                        match message {
                            Ok(Some(frame)) => {
                                if frame.id.as_deref().is_some_and(|frame_id| frame_id != id) {
                                    continue;
                                }
                                match frame.message_type.as_str() {
                                    "next" => {
                                        let Some(payload) = frame.payload else { continue };
                                        let parsed = serde_json::from_value(payload)
                                            .map_err(|err: serde_json::Error| ClientError::Json(err.to_string()));
                                        let stop = parsed.is_err();
                                        if tx.send(parsed).await.is_err() || stop {
                                            break;
                                        }
                                    }
                                    "error" => {
                                        let _ = tx
                                            .send(Err(ClientError::graphql(decode_errors(frame.payload))))
                                            .await;
                                        break;
                                    }
                                    "complete" => break,
                                    "ping" => {
                                        if session.send_pong(frame).await.is_err() {
                                            break;
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                let _ = tx.send(Err(err)).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

fn decode_errors(payload: Option<serde_json::Value>) -> Vec<graphmux_core::GraphqlError> {
    payload
        .and_then(|value| {
            if value.is_array() {
                serde_json::from_value(value).ok()
            } else {
                serde_json::from_value(value).ok().map(|err| vec![err])
            }
        })
        .unwrap_or_default()
}

/// One live socket with protocol-level send/receive helpers.
struct WsSession {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WsSession {
    const fn new(inner: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    async fn send_json(&mut self, message: &GraphqlWsMessage) -> Result<(), ClientError> {
        let text = serde_json::to_string(message)?;
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| ClientError::protocol(err.to_string()))
    }

    async fn send_pong(&mut self, ping: GraphqlWsMessage) -> Result<(), ClientError> {
        self.send_json(&GraphqlWsMessage {
            message_type: "pong".to_string(),
            id: ping.id,
            payload: ping.payload,
        })
        .await
    }

    /// Receive the next protocol frame, transparently answering
    /// socket-level pings. `None` means the connection ended.
    async fn recv_data(&mut self) -> Result<Option<GraphqlWsMessage>, ClientError> {
        if self.closed {
            return Ok(None);
        }
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_ref())
                        .map(Some)
                        .map_err(|err| ClientError::Json(err.to_string()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return serde_json::from_slice(bytes.as_ref())
                        .map(Some)
                        .map_err(|err| ClientError::Json(err.to_string()));
                }
                Some(Ok(Message::Ping(payload))) => {
                    self.inner
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|err| ClientError::protocol(err.to_string()))?;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Err(err)) => {
                    self.closed = true;
                    return Err(ClientError::protocol(err.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if !self.closed {
            self.closed = true;
            self.inner
                .close(None)
                .await
                .map_err(|err| ClientError::protocol(err.to_string()))?;
        }
        Ok(())
    }
}
