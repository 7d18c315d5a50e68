//! The two-leg call and its dial/bridge/hangup state machine.

use std::fmt;

use tracing::{debug, info, warn};

use crate::command::{AriClient, Method};

/// Role mask for channel-id lookups over the live call set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegRole {
    /// Match the dialing (inbound) leg only.
    Dialing,
    /// Match the dialed (originated) leg only.
    Dialed,
    /// Match either leg.
    Either,
}

impl fmt::Display for LegRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegRole::Dialing => "dialing",
            LegRole::Dialed => "dialed",
            LegRole::Either => "either",
        };
        f.write_str(name)
    }
}

/// Bridge lifecycle of a call, made explicit so the teardown decision table
/// is exhaustive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    /// No bridge exists or has been requested.
    NoBridge,
    /// A create-bridge command is in flight.
    Forming,
    /// Both legs are joined in the bridge with this id.
    Bridged(String),
}

/// The logical pairing of a dialing leg and a dialed leg, optionally joined
/// by a mixing bridge.
///
/// A leg slot becomes `None` once that leg has hung up; the call is fully
/// torn down exactly when both slots are empty, at which point the owning
/// registry removes it. Hangup of one leg always attempts to terminate the
/// counterpart: delete the still-live other leg, or, once both legs are
/// gone, delete the bridge that joined them.
#[derive(Debug)]
pub struct Call {
    client: AriClient,
    dialing: Option<String>,
    dialed: Option<String>,
    bridge: BridgeState,
}

impl Call {
    pub(crate) fn new(
        client: AriClient,
        dialing: impl Into<String>,
        dialed: impl Into<String>,
    ) -> Self {
        Self {
            client,
            dialing: Some(dialing.into()),
            dialed: Some(dialed.into()),
            bridge: BridgeState::NoBridge,
        }
    }

    /// Whether this call references `id` under the given role mask.
    pub fn has_leg(&self, id: &str, role: LegRole) -> bool {
        let dialing = self.dialing.as_deref() == Some(id);
        let dialed = self.dialed.as_deref() == Some(id);
        match role {
            LegRole::Dialing => dialing,
            LegRole::Dialed => dialed,
            LegRole::Either => dialing || dialed,
        }
    }

    /// Id of the dialing leg, if it has not hung up.
    pub fn dialing_leg(&self) -> Option<&str> {
        self.dialing
            .as_deref()
    }

    /// Id of the dialed leg, if it has not hung up.
    pub fn dialed_leg(&self) -> Option<&str> {
        self.dialed
            .as_deref()
    }

    /// Current bridge lifecycle state.
    pub fn bridge_state(&self) -> &BridgeState {
        &self.bridge
    }

    /// `true` once both legs have hung up.
    pub fn is_torn_down(&self) -> bool {
        self.dialing.is_none() && self.dialed.is_none()
    }

    /// The dialed leg reports Ringing: relay ring to the dialing leg.
    pub(crate) fn dialed_ringing(&self) {
        let Some(dialing) = &self.dialing else {
            warn!("ring relay skipped: dialing leg already gone");
            return;
        };
        self.client
            .send(Method::Post, format!("/ari/channels/{dialing}/ring"))
            .log_failure("ring request");
    }

    /// The dialed leg entered the application: answer the dialing leg.
    ///
    /// A 500 here means the dialing leg no longer exists; it may have hung
    /// up while the dialed party was picking up. Benign, reported at debug.
    pub(crate) fn dialed_entered(&self) {
        let Some(dialing) = &self.dialing else {
            warn!("answer skipped: dialing leg already gone");
            return;
        };
        let proxy = self
            .client
            .send(Method::Post, format!("/ari/channels/{dialing}/answer"));
        tokio::spawn(async move {
            match proxy.await {
                Err(e) => warn!("answer request: transport error: {e}"),
                Ok(r) if r.status() == 500 => {
                    debug!("answer request: channel already gone");
                }
                Ok(r) if !r.is_success() => {
                    warn!(
                        "answer request: negative response: {} {}",
                        r.status(),
                        r.reason()
                    );
                }
                Ok(_) => {}
            }
        });
    }

    /// Claim the bridge-forming slot ahead of the create-bridge command.
    ///
    /// Refuses unless both legs are present and no bridge exists or is in
    /// flight, making duplicate Up notifications idempotent.
    pub(crate) fn begin_bridge(&mut self) -> bool {
        if self.bridge != BridgeState::NoBridge {
            return false;
        }
        if self.dialing.is_none() || self.dialed.is_none() {
            return false;
        }
        self.bridge = BridgeState::Forming;
        true
    }

    /// The create-bridge command succeeded: join both legs.
    ///
    /// If a leg hung up while the bridge was forming, the fresh bridge is
    /// deleted instead of attached; a bridge id is never stored without
    /// both legs present.
    pub(crate) fn bridge_formed(&mut self, bridge_id: String) {
        match (&self.dialing, &self.dialed) {
            (Some(dialing), Some(dialed)) => {
                info!("bridging {dialing} + {dialed} in {bridge_id}");
                self.client
                    .send(
                        Method::Post,
                        format!("/ari/bridges/{bridge_id}/addChannel?channel={dialing},{dialed}"),
                    )
                    .log_failure("bridge join");
                self.bridge = BridgeState::Bridged(bridge_id);
            }
            _ => {
                warn!("a leg hung up while bridge {bridge_id} was forming, deleting it");
                self.client
                    .send(Method::Delete, format!("/ari/bridges/{bridge_id}"))
                    .log_failure("bridge delete");
                self.bridge = BridgeState::NoBridge;
            }
        }
    }

    /// The server destroyed a leg: clear it and cascade to the counterpart.
    ///
    /// Returns `true` when the call is fully torn down and must be removed.
    /// Safe to call for either leg, in any order; the second invocation
    /// finds the other slot empty and tears down the bridge if one formed.
    pub(crate) fn leg_destroyed(&mut self, id: &str) -> bool {
        if self.dialing.as_deref() == Some(id) {
            self.dialing = None;
        } else if self.dialed.as_deref() == Some(id) {
            self.dialed = None;
        } else {
            return self.is_torn_down();
        }

        let other = self
            .dialing
            .as_deref()
            .or(self.dialed.as_deref());
        match other {
            Some(other) => {
                info!("leg {id} destroyed, hanging up counterpart {other}");
                self.client
                    .send(Method::Delete, format!("/ari/channels/{other}"))
                    .log_failure("cascading hangup");
            }
            None => {
                if let BridgeState::Bridged(bridge) = &self.bridge {
                    info!("last leg {id} destroyed, deleting bridge {bridge}");
                    self.client
                        .send(Method::Delete, format!("/ari/bridges/{bridge}"))
                        .log_failure("bridge delete");
                }
            }
        }

        self.is_torn_down()
    }
}
