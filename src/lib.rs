//! Asterisk REST Interface (ARI) call-control engine for Rust
//!
//! This crate provides the asynchronous command/event engine behind an ARI
//! Stasis application: commands are HTTP-style verb+path requests against
//! the signaling server, asynchronous notifications about call and channel
//! state arrive on a persistent event stream, and the call-control state
//! machine reacts to them to steer live calls (ringing, answering,
//! bridging, hangup).
//!
//! # Architecture
//!
//! The engine splits along the same lines as the protocol:
//! - [`AriClient`] (Clone + Send): issue commands from any task; each
//!   command yields exactly one [`CommandOutcome`] through its
//!   [`CommandProxy`], which is a [`Future`](std::future::Future).
//! - [`AriEventStream`]: inbound event documents from the server.
//! - [`EventDispatcher`]: demultiplexes the tagged event stream to
//!   per-type handlers on a single loop.
//! - [`CallRegistry`]: owns the live [`Call`]s and [`Channel`]s and
//!   implements the two-leg dial/bridge/hangup protocol.
//!
//! The wire itself (HTTP requests, the WebSocket event connection,
//! authentication) is deliberately outside this crate: a wire adapter
//! consumes the [`TransportEndpoint`] end of the seam. See the
//! [`transport`] module.
//!
//! # Example
//!
//! ```rust,no_run
//! use asterisk_ari_tokio::{transport, CallRegistry, EventDispatcher, MAX_EVENT_QUEUE_SIZE};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (client, events, endpoint) = transport::channel(MAX_EVENT_QUEUE_SIZE);
//!     // Hand `endpoint` to a wire adapter that performs the HTTP requests
//!     // and feeds parsed WebSocket events.
//!     # drop(endpoint);
//!
//!     let mut dispatcher = EventDispatcher::new();
//!     let registry = CallRegistry::new(client, "attendant");
//!     registry.subscribe(&mut dispatcher);
//!
//!     // Runs until the transport ends. Connection loss is terminal.
//!     dispatcher.run(events).await;
//! }
//! ```
//!
//! # Issuing commands
//!
//! A [`CommandProxy`] resolves to the command's single outcome; chaining a
//! follow-up means awaiting the outcome and issuing the next command. The
//! engine never interprets status codes on its own:
//!
//! ```rust,no_run
//! use asterisk_ari_tokio::{AriClient, Method};
//!
//! async fn ring_then_answer(client: &AriClient, id: &str) {
//!     let outcome = client
//!         .send(Method::Post, format!("/ari/channels/{id}/ring"))
//!         .await;
//!     if matches!(outcome, Ok(r) if r.is_success()) {
//!         client
//!             .send(Method::Post, format!("/ari/channels/{id}/answer"))
//!             .log_failure("answer request");
//!     }
//! }
//! ```

pub mod call;
pub mod channel;
pub mod command;
pub mod constants;
pub mod error;
pub mod event;
pub mod json;
pub mod registry;
pub mod transport;

pub use call::{BridgeState, Call, LegRole};
pub use channel::{Channel, ChannelState};
pub use command::{AriClient, AriResponse, CommandOutcome, CommandProxy, Method};
pub use constants::{DEFAULT_ARI_PORT, MAX_EVENT_QUEUE_SIZE};
pub use error::{AriError, AriResult};
pub use event::{AriEventType, EventDispatcher, ParseEventTypeError};
pub use registry::CallRegistry;
pub use transport::{
    AriConfig, AriEventStream, CommandRequest, TransportEndpoint, TransportError,
};
