//! The relay: sessions, mailboxes and the event bus behind one handle.
//!
//! Every inbound call goes through here. Store mutations are committed (and
//! their locks released) before any event is dispatched, so a handler always
//! observes the new session state and may call back into the relay.

use crate::bus::{DispatchOutcome, EventBus};
use crate::error::{RelayError, RelayResult};
use crate::events;
use crate::mailbox::MailboxStore;
use crate::registry::{AnnounceOutcome, DisconnectOutcome, SessionRegistry};
use crate::token::TokenAuthority;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Cadence of eviction checks.
    pub sweep_interval: Duration,
    /// Maximum silence before a session is evicted.
    pub idle_timeout: Duration,
    /// Clear a client's mailbox when its session ends.
    pub purge_mailbox_on_disconnect: bool,
    /// Reject calls without a valid token.
    pub require_token: bool,
    /// Lifetime of issued tokens in seconds.
    pub token_ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10),
            purge_mailbox_on_disconnect: false,
            require_token: false,
            token_ttl_secs: 86400,
        }
    }
}

/// Returned by [`Relay::announce`].
#[derive(Debug, Clone)]
pub struct AnnounceReceipt {
    pub outcome: AnnounceOutcome,
    /// Token bound to the announced name. Issued on first sight, and renewed
    /// on a refresh only for a caller that presented a valid token.
    pub token: Option<String>,
}

/// Owns the relay state. Construct once and share behind an `Arc`.
pub struct Relay {
    config: RelayConfig,
    sessions: SessionRegistry,
    mailboxes: MailboxStore,
    bus: EventBus,
    tokens: TokenAuthority,
}

impl Relay {
    /// Create a relay with empty stores and no handlers.
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let tokens = TokenAuthority::new(config.token_ttl_secs, config.require_token)?;
        Ok(Self {
            config,
            sessions: SessionRegistry::new(),
            mailboxes: MailboxStore::new(),
            bus: EventBus::new(),
            tokens,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn mailboxes(&self) -> &MailboxStore {
        &self.mailboxes
    }

    /// The handler table. Applications register their callbacks here.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    /// Register or refresh `name`; dispatches "connect" on first sight.
    ///
    /// Refreshing a live session is subject to the token policy, so a
    /// stranger cannot keep someone else's session alive or obtain a token
    /// for it. `payload` is the caller's request body, handed to the connect
    /// handler.
    pub fn announce(
        &self,
        name: &str,
        token: Option<&str>,
        payload: &Value,
    ) -> RelayResult<AnnounceReceipt> {
        let outcome = self
            .sessions
            .announce_authorized(name, Instant::now(), || self.tokens.check(name, token))?;

        let token = match outcome {
            AnnounceOutcome::Connected => {
                info!(name = %name, "client connected");
                self.bus.dispatch(events::CONNECT, payload);
                Some(self.tokens.issue(name))
            }
            AnnounceOutcome::AlreadyConnected => {
                debug!(name = %name, "client pinged");
                token
                    .filter(|t| self.tokens.verify(name, t).is_ok())
                    .map(|_| self.tokens.issue(name))
            }
        };

        Ok(AnnounceReceipt { outcome, token })
    }

    /// Explicitly end the session for `name`; dispatches "disconnect" if one existed.
    pub fn disconnect(
        &self,
        name: &str,
        token: Option<&str>,
        payload: &Value,
    ) -> RelayResult<DisconnectOutcome> {
        require_name(name)?;
        self.tokens.check(name, token)?;

        let outcome = self.sessions.disconnect(name);
        if outcome == DisconnectOutcome::Disconnected {
            info!(name = %name, "client disconnected");
            self.end_session(name, payload);
        }
        Ok(outcome)
    }

    /// Dispatch `event` on behalf of the connected client named in `data.sender`.
    pub fn send_event(&self, event: &str, data: &Value) -> RelayResult<DispatchOutcome> {
        if event.is_empty() {
            return Err(RelayError::InvalidPayload("event must not be empty".into()));
        }
        let fields = data
            .as_object()
            .ok_or_else(|| RelayError::InvalidPayload("data must be an object".into()))?;

        let sender = match fields.get("sender").and_then(Value::as_str) {
            Some(s) if self.sessions.is_connected(s) => s,
            other => {
                let sender = other.unwrap_or_default().to_string();
                debug!(event = %event, sender = %sender, "event from unknown client rejected");
                return Err(RelayError::ClientNotFound(sender));
            }
        };
        self.tokens
            .check(sender, fields.get("token").and_then(Value::as_str))?;

        Ok(self.bus.dispatch(event, data))
    }

    /// Take the pending message for `name`, if any.
    pub fn poll(&self, name: &str, token: Option<&str>) -> RelayResult<Option<Value>> {
        require_name(name)?;
        self.tokens.check(name, token)?;

        let message = self.mailboxes.take(name);
        if message.is_some() {
            info!(name = %name, "message delivered to client");
        }
        Ok(message)
    }

    /// Queue `message` for `name` directly, bypassing the event bus.
    pub fn queue_for_client(&self, name: &str, message: Value) -> RelayResult<()> {
        require_name(name)?;
        let replaced = self.mailboxes.put(name, message);
        info!(name = %name, replaced, "message queued for client");
        Ok(())
    }

    /// Names of connected clients.
    pub fn clients(&self) -> Vec<String> {
        self.sessions.list_connected()
    }

    /// Evict sessions idle longer than the configured timeout as of `now`.
    ///
    /// Dispatches "disconnect" with `{"name": ..}` once per evicted client.
    pub fn expire(&self, now: Instant) -> Vec<String> {
        let evicted = self.sessions.sweep(now, self.config.idle_timeout);
        for name in &evicted {
            info!(name = %name, "client disconnected due to timeout");
            self.end_session(name, &json!({ "name": name }));
        }
        evicted
    }

    fn end_session(&self, name: &str, payload: &Value) {
        if self.config.purge_mailbox_on_disconnect && self.mailboxes.clear(name) {
            debug!(name = %name, "pending message discarded");
        }
        self.bus.dispatch(events::DISCONNECT, payload);
    }
}

fn require_name(name: &str) -> RelayResult<()> {
    if name.is_empty() {
        return Err(RelayError::InvalidPayload("name must not be empty".into()));
    }
    Ok(())
}
