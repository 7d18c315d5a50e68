//! The transport seam: command requests out, event documents in.
//!
//! The wire itself (HTTP request framing, the WebSocket event connection,
//! TLS, authentication) lives outside this crate. A wire adapter receives a
//! [`TransportEndpoint`], drains [`CommandRequest`]s from it, answers each
//! one exactly once via [`CommandRequest::respond`], and pushes every parsed
//! inbound event document with [`TransportEndpoint::deliver_event`].
//!
//! Dropping the endpoint is connection teardown: every pending
//! [`CommandProxy`](crate::command::CommandProxy) resolves to
//! [`TransportError::ConnectionClosed`] and the event stream ends, which
//! stops [`EventDispatcher::run`](crate::event::EventDispatcher::run).

use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::command::{AriClient, CommandOutcome, Method};
use crate::constants::{DEFAULT_APPLICATION, DEFAULT_ARI_PORT};

/// Connection-level failure, delivered in place of a protocol status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The connection to the signaling server is gone. Also produced when a
    /// command is issued after the wire adapter has shut down.
    #[error("connection closed")]
    ConnectionClosed,
    /// I/O failure reported by the wire adapter (io::Error is not Clone, so
    /// the message is stored).
    #[error("I/O error: {0}")]
    Io(String),
}

/// One in-flight command crossing the transport seam.
///
/// The wire adapter reads [`method()`](Self::method) and
/// [`path()`](Self::path), performs the request, and consumes the request
/// with [`respond()`](Self::respond). Dropping a request without responding
/// resolves the caller's proxy to [`TransportError::ConnectionClosed`];
/// either way the caller sees exactly one outcome.
#[derive(Debug)]
pub struct CommandRequest {
    method: Method,
    path: String,
    reply: oneshot::Sender<CommandOutcome>,
}

impl CommandRequest {
    pub(crate) fn new(
        method: Method,
        path: String,
        reply: oneshot::Sender<CommandOutcome>,
    ) -> Self {
        Self {
            method,
            path,
            reply,
        }
    }

    /// Protocol verb of the command.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Resource path, including any query-encoded parameters.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Deliver the single outcome for this command.
    pub fn respond(self, outcome: CommandOutcome) {
        // The issuer may have dropped its proxy; that is not our problem.
        let _ = self
            .reply
            .send(outcome);
    }
}

/// Connection parameters consumed by a wire adapter.
///
/// Owned and populated by the embedding application (CLI flags, config file);
/// this crate only defines the shape. Defaults match a stock local Asterisk.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AriConfig {
    /// Host name or address of the ARI server.
    pub host: String,
    /// HTTP port of the ARI server.
    pub port: u16,
    /// Username of the ARI account.
    pub username: String,
    /// Password of the ARI account.
    pub password: String,
    /// Stasis application name under which channel legs are tagged.
    pub application: String,
}

impl Default for AriConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_ARI_PORT,
            username: "asterisk".into(),
            password: "asterisk".into(),
            application: DEFAULT_APPLICATION.into(),
        }
    }
}

/// The wire adapter's side of the seam.
pub struct TransportEndpoint {
    requests: mpsc::UnboundedReceiver<CommandRequest>,
    events: mpsc::Sender<Value>,
}

impl std::fmt::Debug for TransportEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEndpoint")
            .field("requests_closed", &self.requests.is_closed())
            .finish()
    }
}

impl TransportEndpoint {
    /// Next command to put on the wire, or `None` once every [`AriClient`]
    /// handle has been dropped.
    pub async fn next_request(&mut self) -> Option<CommandRequest> {
        self.requests
            .recv()
            .await
    }

    /// Deliver one parsed inbound event document to the engine.
    ///
    /// Awaits when the event queue is full (backpressure). Fails with
    /// [`TransportError::ConnectionClosed`] once the [`AriEventStream`]
    /// has been dropped.
    pub async fn deliver_event(&self, event: Value) -> Result<(), TransportError> {
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Inbound event document stream (!Clone).
///
/// Fed by the wire adapter through [`TransportEndpoint::deliver_event`];
/// consumed by [`EventDispatcher::run`](crate::event::EventDispatcher::run)
/// or manually via [`recv()`](Self::recv).
pub struct AriEventStream {
    rx: mpsc::Receiver<Value>,
}

impl std::fmt::Debug for AriEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AriEventStream")
            .field("closed", &self.rx.is_closed())
            .finish()
    }
}

impl AriEventStream {
    /// Receive the next event document, or `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx
            .recv()
            .await
    }
}

impl futures_util::Stream for AriEventStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}

/// Create a connected client / event-stream / endpoint triple.
///
/// `event_queue_size` bounds the inbound event queue
/// ([`MAX_EVENT_QUEUE_SIZE`](crate::constants::MAX_EVENT_QUEUE_SIZE) is a
/// reasonable default). The command queue is unbounded: a command without a
/// response ties up nothing beyond one pending reply slot.
pub fn channel(event_queue_size: usize) -> (AriClient, AriEventStream, TransportEndpoint) {
    let queue_size = event_queue_size.max(1);
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(queue_size);

    debug!("transport seam created (event queue {})", queue_size);

    (
        AriClient::new(request_tx),
        AriEventStream {
            rx: event_rx,
        },
        TransportEndpoint {
            requests: request_rx,
            events: event_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AriResponse;
    use serde_json::json;

    #[test]
    fn config_defaults() {
        let config = AriConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8088);
        assert_eq!(config.username, "asterisk");
        assert_eq!(config.password, "asterisk");
        assert_eq!(config.application, "attendant");
    }

    #[test]
    fn config_deserializes() {
        let config: AriConfig = serde_json::from_value(json!({
            "host": "pbx.example.com",
            "port": 8089,
            "username": "ari",
            "password": "secret",
            "application": "switchboard",
        }))
        .unwrap();
        assert_eq!(config.host, "pbx.example.com");
        assert_eq!(config.application, "switchboard");
    }

    #[tokio::test]
    async fn request_flows_to_endpoint() {
        let (client, _events, mut endpoint) = channel(8);

        let proxy = client.send(Method::Post, "/ari/channels/42/answer");
        let request = endpoint
            .next_request()
            .await
            .unwrap();
        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.path(), "/ari/channels/42/answer");

        request.respond(Ok(AriResponse::new(204, "No Content", None)));
        let outcome = proxy
            .await
            .unwrap();
        assert_eq!(outcome.status(), 204);
    }

    #[tokio::test]
    async fn dropped_endpoint_closes_both_sides() {
        let (client, mut events, endpoint) = channel(8);
        drop(endpoint);

        let outcome = client
            .send(Method::Get, "/ari/asterisk/info")
            .await;
        assert_eq!(outcome, Err(TransportError::ConnectionClosed));
        assert!(events
            .recv()
            .await
            .is_none());
    }

    #[tokio::test]
    async fn event_delivery() {
        let (_client, mut events, endpoint) = channel(8);

        endpoint
            .deliver_event(json!({"type": "StasisStart"}))
            .await
            .unwrap();
        let event = events
            .recv()
            .await
            .unwrap();
        assert_eq!(event["type"], "StasisStart");

        drop(events);
        let result = endpoint
            .deliver_event(json!({"type": "StasisEnd"}))
            .await;
        assert_eq!(result, Err(TransportError::ConnectionClosed));
    }
}
