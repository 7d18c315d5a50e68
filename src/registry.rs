//! The call container: owns the live call set and routes lifecycle events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::call::{Call, LegRole};
use crate::channel::{Channel, ChannelState};
use crate::command::{AriClient, Method};
use crate::error::{AriError, AriResult};
use crate::event::{AriEventType, EventDispatcher};
use crate::json;

struct RegistryInner {
    calls: Vec<Call>,
    channels: HashMap<String, Channel>,
    next_leg_seq: u64,
}

/// Owns the live set of [`Call`]s and the per-leg [`Channel`] entities, and
/// drives the dial protocol from the three call-lifecycle event types.
///
/// Cloning is cheap and shares the same call set; event handlers and command
/// follow-up tasks all route through the shared state. The mutex is held
/// only for synchronous bookkeeping, never across an await.
#[derive(Clone)]
pub struct CallRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    client: AriClient,
    application: Arc<str>,
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRegistry")
            .field("application", &self.application)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl CallRegistry {
    /// Empty registry for the given Stasis application.
    pub fn new(client: AriClient, application: impl Into<String>) -> Self {
        let application: String = application.into();
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                calls: Vec::new(),
                channels: HashMap::new(),
                next_leg_seq: 0,
            })),
            client,
            application: Arc::from(application),
        }
    }

    /// Register the three call-lifecycle handlers on the dispatcher.
    pub fn subscribe(&self, dispatcher: &mut EventDispatcher) {
        let registry = self.clone();
        dispatcher.on_event(AriEventType::StasisStart.as_str(), move |event| {
            registry.on_stasis_start(event)
        });
        let registry = self.clone();
        dispatcher.on_event(AriEventType::ChannelStateChange.as_str(), move |event| {
            registry.on_state_change(event)
        });
        let registry = self.clone();
        dispatcher.on_event(AriEventType::ChannelDestroyed.as_str(), move |event| {
            registry.on_channel_destroyed(event)
        });
    }

    /// Number of live calls.
    pub fn call_count(&self) -> usize {
        self.locked()
            .calls
            .len()
    }

    /// Number of tracked channel legs.
    pub fn channel_count(&self) -> usize {
        self.locked()
            .channels
            .len()
    }

    fn locked(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A leg entered the application. No `args` means a brand-new inbound
    /// dialing leg; otherwise it is the dialed leg reporting in.
    fn on_stasis_start(&self, event: &Value) -> AriResult<()> {
        let args = json::get_string_array(event, &["args"])?;
        if args.is_empty() {
            self.dialing_leg_started(event)
        } else {
            self.dialed_leg_started(event)
        }
    }

    fn dialing_leg_started(&self, event: &Value) -> AriResult<()> {
        let dialing_id = json::get_str(event, &["channel", "id"])?.to_string();
        let name = json::get_str(event, &["channel", "name"])?;
        let extension = json::get_str(event, &["channel", "dialplan", "exten"])?;
        let caller_number = json::get_str(event, &["channel", "caller", "number"])?;
        let caller_name = match json::opt_str(event, &["channel", "caller", "name"]) {
            Some(name) if !name.is_empty() => name,
            _ => caller_number,
        };
        let state = json::opt_str(event, &["channel", "state"]).unwrap_or("");

        let proxy;
        {
            let mut inner = self.locked();
            if inner
                .calls
                .iter()
                .any(|call| call.has_leg(&dialing_id, LegRole::Either))
            {
                warn!("leg {dialing_id} already belongs to a call, ignoring StasisStart");
                return Ok(());
            }

            let dialed_id = format!("{}-{}", self.application, inner.next_leg_seq);
            inner.next_leg_seq += 1;

            let mut dialing = Channel::new(self.client.clone(), dialing_id.clone());
            dialing.set_stasis_metadata(name, extension, caller_number, caller_name);
            dialing.apply_state_code(state);
            let dialed = Channel::new(self.client.clone(), dialed_id.clone());

            info!(
                "new call: {caller_name} ({dialing_id}) dialing exten {extension} as {dialed_id}"
            );
            proxy = dialed.originate(
                &format!("sip/{extension}"),
                &self.application,
                caller_name,
                &["dialed", &dialing_id],
            );

            inner
                .channels
                .insert(dialing_id.clone(), dialing);
            inner
                .channels
                .insert(dialed_id.clone(), dialed);
            inner
                .calls
                .push(Call::new(self.client.clone(), dialing_id.clone(), dialed_id));
        }

        // Outcome handling off the event loop: a rejected originate aborts
        // the nascent call by hanging up the dialing leg. Connection loss is
        // terminal, so a transport error is only reported.
        let client = self.client.clone();
        tokio::spawn(async move {
            match proxy.await {
                Err(e) => error!("originate: transport error: {e}"),
                Ok(r) if !r.is_success() => {
                    error!("originate rejected: {} {}", r.status(), r.reason());
                    client
                        .send(Method::Delete, format!("/ari/channels/{dialing_id}"))
                        .log_failure("abort dialing leg");
                }
                Ok(_) => {}
            }
        });
        Ok(())
    }

    fn dialed_leg_started(&self, event: &Value) -> AriResult<()> {
        let dialed_id = json::get_str(event, &["channel", "id"])?.to_string();
        let mut inner = self.locked();

        if let Some(channel) = inner
            .channels
            .get_mut(&dialed_id)
        {
            channel.set_stasis_metadata(
                json::opt_str(event, &["channel", "name"]).unwrap_or(""),
                json::opt_str(event, &["channel", "dialplan", "exten"]).unwrap_or(""),
                json::opt_str(event, &["channel", "caller", "number"]).unwrap_or(""),
                json::opt_str(event, &["channel", "caller", "name"]).unwrap_or(""),
            );
            if let Some(state) = json::opt_str(event, &["channel", "state"]) {
                channel.apply_state_code(state);
            }
        }

        match inner
            .calls
            .iter()
            .find(|call| call.has_leg(&dialed_id, LegRole::Dialed))
        {
            Some(call) => {
                call.dialed_entered();
                Ok(())
            }
            None => Err(AriError::CallNotFound {
                id: dialed_id,
                role: LegRole::Dialed,
            }),
        }
    }

    fn on_state_change(&self, event: &Value) -> AriResult<()> {
        let id = json::get_str(event, &["channel", "id"])?.to_string();
        let code = json::get_str(event, &["channel", "state"])?;

        let mut inner = self.locked();
        if let Some(channel) = inner
            .channels
            .get_mut(&id)
        {
            channel.apply_state_code(code);
        }

        match ChannelState::from_code(code) {
            ChannelState::Ringing => {
                match inner
                    .calls
                    .iter()
                    .find(|call| call.has_leg(&id, LegRole::Dialed))
                {
                    Some(call) => {
                        call.dialed_ringing();
                        Ok(())
                    }
                    None => Err(AriError::CallNotFound {
                        id,
                        role: LegRole::Dialed,
                    }),
                }
            }
            ChannelState::Up => {
                // Up also fires on legs with no active call (e.g. during
                // teardown); not finding one is not an error.
                let wants_bridge = inner
                    .calls
                    .iter_mut()
                    .find(|call| call.has_leg(&id, LegRole::Dialing))
                    .is_some_and(|call| call.begin_bridge());
                drop(inner);
                if wants_bridge {
                    self.spawn_bridge_create(id);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn spawn_bridge_create(&self, dialing_id: String) {
        let registry = self.clone();
        let proxy = self
            .client
            .send(Method::Post, "/ari/bridges?type=mixing");
        tokio::spawn(async move {
            match proxy.await {
                Err(e) => error!("bridge create: transport error: {e}"),
                Ok(r) if !r.is_success() => {
                    error!("bridge create rejected: {} {}", r.status(), r.reason());
                }
                Ok(r) => {
                    let bridge_id = r
                        .body()
                        .and_then(|body| json::opt_str(body, &["id"]))
                        .map(str::to_string);
                    match bridge_id {
                        Some(bridge_id) => registry.bridge_created(&dialing_id, bridge_id),
                        None => error!("bridge create: response body carries no id"),
                    }
                }
            }
        });
    }

    fn bridge_created(&self, dialing_id: &str, bridge_id: String) {
        let mut inner = self.locked();
        match inner
            .calls
            .iter_mut()
            .find(|call| call.has_leg(dialing_id, LegRole::Dialing))
        {
            Some(call) => call.bridge_formed(bridge_id),
            None => {
                warn!(
                    "call with dialing leg {dialing_id} gone before bridge {bridge_id} formed, \
                     deleting it"
                );
                self.client
                    .send(Method::Delete, format!("/ari/bridges/{bridge_id}"))
                    .log_failure("orphan bridge delete");
            }
        }
    }

    fn on_channel_destroyed(&self, event: &Value) -> AriResult<()> {
        let id = json::get_str(event, &["channel", "id"])?.to_string();
        let mut inner = self.locked();

        if let Some(mut channel) = inner
            .channels
            .remove(&id)
        {
            channel.mark_dead();
        }

        let position = inner
            .calls
            .iter()
            .position(|call| call.has_leg(&id, LegRole::Either));
        match position {
            Some(index) => {
                if inner.calls[index].leg_destroyed(&id) {
                    inner
                        .calls
                        .remove(index);
                    info!("call fully torn down ({} live)", inner.calls.len());
                }
                Ok(())
            }
            None => Err(AriError::CallNotFound {
                id,
                role: LegRole::Either,
            }),
        }
    }
}
