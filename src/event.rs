//! Event types and the per-type event dispatcher.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, trace, warn};

use crate::error::AriResult;
use crate::transport::AriEventStream;

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventTypeError(pub String);

impl std::fmt::Display for ParseEventTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for ParseEventTypeError {}

/// ARI event types, named as they appear in the `type` field of event
/// documents.
///
/// The dispatcher is keyed by plain strings, so unknown or future event
/// types cost nothing; this enum exists for type-safe registration of
/// the types the engine itself consumes. The wire names are case-sensitive
/// CamelCase, and parsing matches them exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum AriEventType {
    StasisStart,
    StasisEnd,
    ChannelCreated,
    ChannelDestroyed,
    ChannelStateChange,
    ChannelHangupRequest,
    ChannelDtmfReceived,
    ChannelVarset,
    ChannelDialplan,
    ChannelCallerId,
    ChannelEnteredBridge,
    ChannelLeftBridge,
    BridgeCreated,
    BridgeDestroyed,
    BridgeMerged,
    DeviceStateChanged,
    PlaybackStarted,
    PlaybackFinished,
}

impl AriEventType {
    /// Wire name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StasisStart => "StasisStart",
            Self::StasisEnd => "StasisEnd",
            Self::ChannelCreated => "ChannelCreated",
            Self::ChannelDestroyed => "ChannelDestroyed",
            Self::ChannelStateChange => "ChannelStateChange",
            Self::ChannelHangupRequest => "ChannelHangupRequest",
            Self::ChannelDtmfReceived => "ChannelDtmfReceived",
            Self::ChannelVarset => "ChannelVarset",
            Self::ChannelDialplan => "ChannelDialplan",
            Self::ChannelCallerId => "ChannelCallerId",
            Self::ChannelEnteredBridge => "ChannelEnteredBridge",
            Self::ChannelLeftBridge => "ChannelLeftBridge",
            Self::BridgeCreated => "BridgeCreated",
            Self::BridgeDestroyed => "BridgeDestroyed",
            Self::BridgeMerged => "BridgeMerged",
            Self::DeviceStateChanged => "DeviceStateChanged",
            Self::PlaybackStarted => "PlaybackStarted",
            Self::PlaybackFinished => "PlaybackFinished",
        }
    }
}

impl std::fmt::Display for AriEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AriEventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let event_type = match s {
            "StasisStart" => Self::StasisStart,
            "StasisEnd" => Self::StasisEnd,
            "ChannelCreated" => Self::ChannelCreated,
            "ChannelDestroyed" => Self::ChannelDestroyed,
            "ChannelStateChange" => Self::ChannelStateChange,
            "ChannelHangupRequest" => Self::ChannelHangupRequest,
            "ChannelDtmfReceived" => Self::ChannelDtmfReceived,
            "ChannelVarset" => Self::ChannelVarset,
            "ChannelDialplan" => Self::ChannelDialplan,
            "ChannelCallerId" => Self::ChannelCallerId,
            "ChannelEnteredBridge" => Self::ChannelEnteredBridge,
            "ChannelLeftBridge" => Self::ChannelLeftBridge,
            "BridgeCreated" => Self::BridgeCreated,
            "BridgeDestroyed" => Self::BridgeDestroyed,
            "BridgeMerged" => Self::BridgeMerged,
            "DeviceStateChanged" => Self::DeviceStateChanged,
            "PlaybackStarted" => Self::PlaybackStarted,
            "PlaybackFinished" => Self::PlaybackFinished,
            other => return Err(ParseEventTypeError(other.to_string())),
        };
        Ok(event_type)
    }
}

type Handler = Box<dyn FnMut(&Value) -> AriResult<()> + Send>;

/// Demultiplexes the tagged event stream to per-type handlers.
///
/// Handlers are registered against an event-type string and invoked in
/// registration order, synchronously, with the full parsed event document.
/// Events with a missing or unmatched `type` are dropped without error.
/// A handler failure (typically a missing field or an unmatched channel id)
/// is logged and the event is skipped; it never escapes the dispatch loop.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Vec<Handler>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registered_types", &self.handlers.len())
            .finish()
    }
}

impl EventDispatcher {
    /// Empty dispatcher with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event type. Multiple handlers may be
    /// registered for the same type; all of them run on each matching event.
    pub fn on_event<F>(&mut self, event_type: impl Into<String>, handler: F)
    where
        F: FnMut(&Value) -> AriResult<()> + Send + 'static,
    {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Route one event document to every handler registered for its type.
    pub fn dispatch(&mut self, event: &Value) {
        let Some(event_type) = event
            .get("type")
            .and_then(Value::as_str)
        else {
            trace!("event without a type field, dropping");
            return;
        };

        match self
            .handlers
            .get_mut(event_type)
        {
            None => trace!("no handler registered for {event_type}, dropping"),
            Some(handlers) => {
                for handler in handlers {
                    if let Err(e) = handler(event) {
                        warn!("handler for {event_type} failed: {e}");
                    }
                }
            }
        }
    }

    /// Drive the dispatcher from the event stream until the transport ends.
    ///
    /// This is the engine's single loop: every handler invocation runs here,
    /// in stream-delivery order, so handlers never race each other.
    pub async fn run(mut self, mut events: AriEventStream) {
        while let Some(event) = events
            .recv()
            .await
        {
            self.dispatch(&event);
        }
        info!("event stream closed, dispatcher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AriError;
    use crate::transport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn event_type_wire_names() {
        assert_eq!(AriEventType::StasisStart.as_str(), "StasisStart");
        assert_eq!(
            AriEventType::ChannelStateChange.to_string(),
            "ChannelStateChange"
        );
        assert_eq!(
            "ChannelDestroyed".parse::<AriEventType>(),
            Ok(AriEventType::ChannelDestroyed)
        );
        assert!("NoSuchEvent"
            .parse::<AriEventType>()
            .is_err());
    }

    #[test]
    fn event_type_parsing_is_case_sensitive() {
        // Wire names are CamelCase; nothing else may match.
        for s in ["stasisstart", "STASISSTART", "stasisStart", "Stasisstart"] {
            let err = s
                .parse::<AriEventType>()
                .unwrap_err();
            assert_eq!(err, ParseEventTypeError(s.to_string()));
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            dispatcher.on_event("StasisStart", move |_| {
                seen.lock()
                    .unwrap()
                    .push(tag);
                Ok(())
            });
        }

        dispatcher.dispatch(&json!({"type": "StasisStart"}));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unmatched_type_invokes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = EventDispatcher::new();
        let counter = calls.clone();
        dispatcher.on_event("StasisStart", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        dispatcher.dispatch(&json!({"type": "SomethingElse"}));
        dispatcher.dispatch(&json!({"no_type_at_all": true}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_failure_does_not_stop_later_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = EventDispatcher::new();

        dispatcher.on_event("ChannelDestroyed", |_| {
            Err(AriError::MissingField {
                path: "channel.id".into(),
            })
        });
        let counter = calls.clone();
        dispatcher.on_event("ChannelDestroyed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        dispatcher.dispatch(&json!({"type": "ChannelDestroyed"}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_drains_stream_then_stops() {
        let (_client, events, endpoint) = transport::channel(4);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = EventDispatcher::new();
        let counter = calls.clone();
        dispatcher.on_event("ChannelVarset", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let loop_task = tokio::spawn(dispatcher.run(events));

        for _ in 0..3 {
            endpoint
                .deliver_event(json!({"type": "ChannelVarset"}))
                .await
                .unwrap();
        }
        drop(endpoint);

        loop_task
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
