//! Command dispatch: issue a verb+path request, get exactly one outcome.
//!
//! [`AriClient::send`] hands the command to the transport and returns a
//! [`CommandProxy`], an owned handle on the in-flight command. The proxy
//! implements [`Future`] and resolves to the single [`CommandOutcome`]:
//! awaiting it suspends the task (never a thread), and what the caller does
//! with the outcome (issue a follow-up, give up, log it) is the caller's
//! policy. The dispatcher itself does not interpret status codes and never
//! aborts a chain on non-2xx.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{AriError, AriResult};
use crate::transport::{CommandRequest, TransportError};

/// Protocol verbs for ARI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Method {
    /// Read a resource.
    Get,
    /// Create a resource or trigger an operation.
    Post,
    /// Destroy a resource (hang up a channel, tear down a bridge).
    Delete,
    /// Replace or update a resource.
    Put,
}

impl Method {
    /// Wire-format verb string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Put => "PUT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-level outcome of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct AriResponse {
    status: u16,
    reason: String,
    body: Option<Value>,
}

impl AriResponse {
    /// Build a response from the wire-level pieces.
    pub fn new(status: u16, reason: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            status,
            reason: reason.into(),
            body,
        }
    }

    /// HTTP-style status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase accompanying the status.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Parsed response body, if the server sent one.
    pub fn body(&self) -> Option<&Value> {
        self.body
            .as_ref()
    }

    /// `true` for a 2xx status. A convention of calling code, not enforced
    /// anywhere by the dispatcher.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert to a result based on the success convention.
    ///
    /// ```
    /// # use asterisk_ari_tokio::AriResponse;
    /// let resp = AriResponse::new(404, "Not Found", None);
    /// assert!(resp.into_result().is_err());
    /// ```
    pub fn into_result(self) -> AriResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AriError::CommandRejected {
                status: self.status,
                reason: self.reason,
            })
        }
    }
}

/// The single outcome of an issued command: a protocol-level response, or a
/// connection-level failure with no status available.
pub type CommandOutcome = Result<AriResponse, TransportError>;

/// Owned handle on one in-flight command.
///
/// Resolves to exactly one [`CommandOutcome`]: never zero, never more than
/// one. If the transport goes away before answering, the proxy resolves to
/// [`TransportError::ConnectionClosed`].
#[derive(Debug)]
pub struct CommandProxy {
    rx: oneshot::Receiver<CommandOutcome>,
    method: Method,
    path: String,
}

impl CommandProxy {
    /// Verb of the command this proxy tracks.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path of the command this proxy tracks.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Await the outcome on a background task, logging any failure.
    ///
    /// For fire-and-forget commands where no local state depends on the
    /// outcome: transport errors and non-2xx statuses are reported under
    /// `context` and otherwise dropped.
    pub fn log_failure(self, context: &'static str) {
        tokio::spawn(async move {
            match self.await {
                Err(e) => warn!("{context}: transport error: {e}"),
                Ok(r) if !r.is_success() => {
                    warn!("{context}: negative response: {} {}", r.status(), r.reason());
                }
                Ok(_) => {}
            }
        });
    }
}

impl Future for CommandProxy {
    type Output = CommandOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Transport dropped the reply slot without answering.
            Poll::Ready(Err(_)) => Poll::Ready(Err(TransportError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Command dispatcher handle (Clone + Send) for issuing commands from any task.
#[derive(Clone)]
pub struct AriClient {
    tx: mpsc::UnboundedSender<CommandRequest>,
}

impl std::fmt::Debug for AriClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AriClient")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl AriClient {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CommandRequest>) -> Self {
        Self {
            tx,
        }
    }

    /// Issue a command: one write to the transport, one eventual outcome.
    ///
    /// Never blocks; the returned proxy is awaited (or handed to
    /// [`CommandProxy::log_failure`]) at the caller's leisure. Path
    /// parameters are the caller's to encode; no validation is performed.
    pub fn send(&self, method: Method, path: impl Into<String>) -> CommandProxy {
        let path = path.into();
        let (reply_tx, reply_rx) = oneshot::channel();

        debug!("issuing {} {}", method, path);
        // A closed transport drops the request, and with it the reply
        // sender, so the proxy still resolves exactly once.
        let _ = self
            .tx
            .send(CommandRequest::new(method, path.clone(), reply_tx));

        CommandProxy {
            rx: reply_rx,
            method,
            path,
        }
    }

    /// Whether the transport is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self
            .tx
            .is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport;
    use serde_json::json;

    #[test]
    fn method_strings() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Post.as_str(), "POST");
        assert_eq!(Method::Delete.as_str(), "DELETE");
        assert_eq!(Method::Put.as_str(), "PUT");
        assert_eq!(Method::Post.to_string(), "POST");
    }

    #[test]
    fn success_is_whole_2xx_range() {
        assert!(AriResponse::new(200, "OK", None).is_success());
        assert!(AriResponse::new(204, "No Content", None).is_success());
        assert!(AriResponse::new(299, "", None).is_success());
        assert!(!AriResponse::new(199, "", None).is_success());
        assert!(!AriResponse::new(300, "", None).is_success());
        assert!(!AriResponse::new(500, "Internal Server Error", None).is_success());
    }

    #[test]
    fn into_result_classification() {
        assert!(AriResponse::new(200, "OK", None)
            .into_result()
            .is_ok());
        let err = AriResponse::new(409, "Conflict", None)
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "command rejected: 409 Conflict");
    }

    #[tokio::test]
    async fn exactly_one_outcome_per_command() {
        let (client, _events, mut endpoint) = transport::channel(4);

        let proxy = client.send(Method::Post, "/ari/bridges?type=mixing");
        assert_eq!(proxy.method(), Method::Post);
        assert_eq!(proxy.path(), "/ari/bridges?type=mixing");

        let request = endpoint
            .next_request()
            .await
            .unwrap();
        request.respond(Ok(AriResponse::new(
            200,
            "OK",
            Some(json!({"id": "bridge-1"})),
        )));

        // Awaiting consumes the proxy: the one outcome is delivered once.
        let response = proxy
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().unwrap()["id"], "bridge-1");
    }

    #[tokio::test]
    async fn transport_error_is_the_only_outcome() {
        let (client, _events, mut endpoint) = transport::channel(4);

        let proxy = client.send(Method::Delete, "/ari/channels/gone");
        let request = endpoint
            .next_request()
            .await
            .unwrap();
        // Wire adapter tears down without answering.
        drop(request);

        assert_eq!(proxy.await, Err(TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn send_after_shutdown_still_resolves() {
        let (client, _events, endpoint) = transport::channel(4);
        drop(endpoint);

        assert!(!client.is_connected());
        let outcome = client
            .send(Method::Get, "/ari/asterisk/info")
            .await;
        assert_eq!(outcome, Err(TransportError::ConnectionClosed));
    }
}
