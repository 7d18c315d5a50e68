//! Channel leg entity and its normalized state.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::command::{AriClient, CommandProxy, Method};

/// Normalized channel state, derived from the `channel.state` wire string.
///
/// The set is closed: every wire string maps to a defined value, and
/// anything unrecognized maps to [`Unknown`](Self::Unknown); there is no
/// error path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ChannelState {
    Down,
    Reserved,
    OffHook,
    Dialing,
    Ring,
    Ringing,
    Up,
    Busy,
    DialingOffhook,
    PreRing,
    Mute,
    Unknown,
}

impl ChannelState {
    /// Map a wire state code to its normalized value. Never fails.
    pub fn from_code(code: &str) -> Self {
        match code {
            "Down" => Self::Down,
            "Rsrvd" => Self::Reserved,
            "OffHook" => Self::OffHook,
            "Dialing" => Self::Dialing,
            "Ring" => Self::Ring,
            "Ringing" => Self::Ringing,
            "Up" => Self::Up,
            "Busy" => Self::Busy,
            "Dialing Offhook" => Self::DialingOffhook,
            "Pre-ring" => Self::PreRing,
            "Mute" => Self::Mute,
            _ => Self::Unknown,
        }
    }

    /// Canonical wire string for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Down => "Down",
            Self::Reserved => "Rsrvd",
            Self::OffHook => "OffHook",
            Self::Dialing => "Dialing",
            Self::Ring => "Ring",
            Self::Ringing => "Ringing",
            Self::Up => "Up",
            Self::Busy => "Busy",
            Self::DialingOffhook => "Dialing Offhook",
            Self::PreRing => "Pre-ring",
            Self::Mute => "Mute",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a call, identified by its channel id.
///
/// Read accessors are public; mutation (`set_stasis_metadata`,
/// `apply_state_code`, `mark_dead`) is crate-private so only the owning
/// [`CallRegistry`](crate::registry::CallRegistry) can change a channel:
/// a single writer, no state drift.
///
/// The command methods each issue exactly one command and return its proxy;
/// they perform no local validation of the channel's current state. The
/// server is authoritative.
#[derive(Debug)]
pub struct Channel {
    id: String,
    client: AriClient,
    dead: bool,
    state: ChannelState,
    name: String,
    extension: String,
    caller_number: String,
    caller_name: String,
}

impl Channel {
    pub(crate) fn new(client: AriClient, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client,
            dead: false,
            state: ChannelState::Unknown,
            name: String::new(),
            extension: String::new(),
            caller_number: String::new(),
            caller_name: String::new(),
        }
    }

    /// Channel id, assigned by the server or synthesized for outbound legs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current normalized state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether the server has reported this leg destroyed.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Technology-qualified channel name (e.g. `PJSIP/alice-00000001`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dialplan extension the leg requested.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Caller id number.
    pub fn caller_number(&self) -> &str {
        &self.caller_number
    }

    /// Caller id display name.
    pub fn caller_name(&self) -> &str {
        &self.caller_name
    }

    pub(crate) fn set_stasis_metadata(
        &mut self,
        name: &str,
        extension: &str,
        caller_number: &str,
        caller_name: &str,
    ) {
        self.name = name.to_string();
        self.extension = extension.to_string();
        self.caller_number = caller_number.to_string();
        self.caller_name = caller_name.to_string();
    }

    pub(crate) fn apply_state_code(&mut self, code: &str) {
        self.state = ChannelState::from_code(code);
    }

    pub(crate) fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// Ring this leg.
    pub fn ring(&self) -> CommandProxy {
        self.client
            .send(Method::Post, format!("/ari/channels/{}/ring", self.id))
    }

    /// Answer this leg.
    pub fn answer(&self) -> CommandProxy {
        self.client
            .send(Method::Post, format!("/ari/channels/{}/answer", self.id))
    }

    /// Hang this leg up.
    pub fn hangup(&self) -> CommandProxy {
        self.client
            .send(Method::Delete, format!("/ari/channels/{}", self.id))
    }

    /// Originate this leg at `endpoint` under the Stasis application `app`,
    /// using this channel's id as the new leg's id.
    ///
    /// `caller_id` is percent-encoded; `app_args` are passed through as a
    /// comma-separated list (no timeout is enforced on the dial).
    pub fn originate(
        &self,
        endpoint: &str,
        app: &str,
        caller_id: &str,
        app_args: &[&str],
    ) -> CommandProxy {
        let caller_id = utf8_percent_encode(caller_id, NON_ALPHANUMERIC);
        let path = format!(
            "/ari/channels?endpoint={endpoint}&app={app}&channelId={}&callerId={caller_id}&timeout=-1&appArgs={}",
            self.id,
            app_args.join(","),
        );
        self.client
            .send(Method::Post, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport;

    #[test]
    fn state_code_table() {
        let table = [
            ("Down", ChannelState::Down),
            ("Rsrvd", ChannelState::Reserved),
            ("OffHook", ChannelState::OffHook),
            ("Dialing", ChannelState::Dialing),
            ("Ring", ChannelState::Ring),
            ("Ringing", ChannelState::Ringing),
            ("Up", ChannelState::Up),
            ("Busy", ChannelState::Busy),
            ("Dialing Offhook", ChannelState::DialingOffhook),
            ("Pre-ring", ChannelState::PreRing),
            ("Mute", ChannelState::Mute),
            ("Unknown", ChannelState::Unknown),
        ];
        for (code, state) in table {
            assert_eq!(ChannelState::from_code(code), state, "code {code:?}");
            assert_eq!(state.as_str(), code);
        }
    }

    #[test]
    fn unrecognized_codes_map_to_unknown() {
        for code in ["", "down", "RINGING", "Hold", "garbage", "Pre-Ring"] {
            assert_eq!(ChannelState::from_code(code), ChannelState::Unknown);
        }
    }

    #[test]
    fn new_channel_defaults() {
        let (client, _events, _endpoint) = transport::channel(1);
        let ch = Channel::new(client, "1234.56");
        assert_eq!(ch.id(), "1234.56");
        assert_eq!(ch.state(), ChannelState::Unknown);
        assert!(!ch.is_dead());
        assert!(ch.name().is_empty());
    }

    #[test]
    fn metadata_and_state_mutation() {
        let (client, _events, _endpoint) = transport::channel(1);
        let mut ch = Channel::new(client, "1234.56");

        ch.set_stasis_metadata("PJSIP/alice-00000001", "600", "555", "Alice");
        ch.apply_state_code("Ring");
        assert_eq!(ch.name(), "PJSIP/alice-00000001");
        assert_eq!(ch.extension(), "600");
        assert_eq!(ch.caller_number(), "555");
        assert_eq!(ch.caller_name(), "Alice");
        assert_eq!(ch.state(), ChannelState::Ring);

        ch.apply_state_code("something new");
        assert_eq!(ch.state(), ChannelState::Unknown);

        ch.mark_dead();
        assert!(ch.is_dead());
    }

    #[test]
    fn command_paths() {
        let (client, _events, _endpoint) = transport::channel(1);
        let ch = Channel::new(client, "1234.56");

        let proxy = ch.ring();
        assert_eq!(proxy.method(), Method::Post);
        assert_eq!(proxy.path(), "/ari/channels/1234.56/ring");

        assert_eq!(ch.answer().path(), "/ari/channels/1234.56/answer");

        let proxy = ch.hangup();
        assert_eq!(proxy.method(), Method::Delete);
        assert_eq!(proxy.path(), "/ari/channels/1234.56");
    }

    #[test]
    fn originate_query() {
        let (client, _events, _endpoint) = transport::channel(1);
        let ch = Channel::new(client, "attendant-7");

        let proxy = ch.originate("sip/600", "attendant", "Alice Smith", &["dialed", "1234.56"]);
        assert_eq!(proxy.method(), Method::Post);
        assert_eq!(
            proxy.path(),
            "/ari/channels?endpoint=sip/600&app=attendant&channelId=attendant-7\
             &callerId=Alice%20Smith&timeout=-1&appArgs=dialed,1234.56"
        );
    }
}
