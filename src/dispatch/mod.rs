//! Event dispatcher.
//!
//! Routes each decoded inbound event through authentication, authorization,
//! validation and rate limiting, mutates the store, and emits the resulting
//! outbound events to the right rooms. Domain errors become a `server_error`
//! for the originator; nothing else observes a failed event.

pub mod bots;
pub mod channel;
pub mod messaging;
pub mod session;

use crate::commands;
use crate::config::Config;
use crate::error::{HandlerError, HandlerResult};
use crate::hub::{Hub, SessionHandle, alias_room};
use crate::security::RateLimitManager;
use crate::store::{Store, now_ms};
use std::sync::Arc;
use tracing::{debug, info};
use ultra_proto::envelope::{
    AliasResult, ChannelEventPayload, ChannelEventType, MessageEventPayload, MessageEventType,
    PresencePayload,
};
use ultra_proto::{ClientEvent, MessageKind, MessageRecord, PresenceStatus, Scope, ServerEvent};
use uuid::Uuid;

/// What the connection loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

/// Shared handles threaded through every event handler.
pub struct Dispatcher {
    pub store: Arc<Store>,
    pub hub: Arc<Hub>,
    pub limiter: Arc<RateLimitManager>,
    pub config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<Store>,
        hub: Arc<Hub>,
        limiter: Arc<RateLimitManager>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            hub,
            limiter,
            config,
        }
    }

    /// Handle one decoded inbound event from a session.
    pub fn handle(&self, handle: &Arc<SessionHandle>, event: ClientEvent) -> Flow {
        debug!(session = %handle.session_id, event = ?event_name(&event), "Inbound event");

        let result = match event {
            ClientEvent::HelloDevice(p) => session::hello_device(self, handle, p).map(|_| Flow::Continue),
            ClientEvent::ClaimAlias(p) => {
                // Claim refusals answer through `alias_result` rather than a
                // bare `server_error`, so the client can drive its UI.
                return match session::claim_alias(self, handle, p) {
                    Ok(()) => Flow::Continue,
                    Err(e) => {
                        self.hub.send(
                            handle,
                            ServerEvent::AliasResult(AliasResult {
                                ok: false,
                                alias: None,
                                reclaim_nonce: None,
                                error_key: Some(e.code()),
                                message: Some(e.to_string()),
                            }),
                        );
                        Flow::Continue
                    }
                };
            }
            ClientEvent::CommandExec(p) => commands::execute_raw(self, handle, p),
            ClientEvent::JoinChannel(p) => {
                channel::join_channel(self, handle, &p.channel).map(|_| Flow::Continue)
            }
            ClientEvent::PartChannel(p) => {
                channel::part_channel(self, handle, &p.channel, p.reason.as_deref())
                    .map(|_| Flow::Continue)
            }
            ClientEvent::SendChannelMessage(p) => {
                messaging::send_channel_message(self, handle, p).map(|_| Flow::Continue)
            }
            ClientEvent::SendDmMessage(p) => {
                messaging::send_dm_message(self, handle, p).map(|_| Flow::Continue)
            }
            ClientEvent::ReactToggle(p) => {
                messaging::react_toggle(self, handle, p).map(|_| Flow::Continue)
            }
            ClientEvent::MessageEdit(p) => {
                messaging::message_edit(self, handle, p).map(|_| Flow::Continue)
            }
            ClientEvent::MessageDelete(p) => {
                messaging::message_delete(self, handle, p).map(|_| Flow::Continue)
            }
            ClientEvent::HistoryFetch(p) => {
                messaging::history_fetch(self, handle, p).map(|_| Flow::Continue)
            }
            ClientEvent::TypingState(p) => {
                channel::typing_state(self, handle, p).map(|_| Flow::Continue)
            }
            ClientEvent::BotInvoke(p) => bots::bot_invoke(self, handle, p).map(|_| Flow::Continue),
        };

        match result {
            Ok(flow) => flow,
            Err(e) => {
                debug!(
                    session = %handle.session_id,
                    code = e.error_code(),
                    "Event refused"
                );
                self.hub.send_error(handle, e.code(), e.to_string());
                Flow::Continue
            }
        }
    }

    /// Handle a raw inbound frame; a decode failure is a `BAD_REQUEST`.
    pub fn handle_raw(&self, handle: &Arc<SessionHandle>, raw: &str) -> Flow {
        match ClientEvent::decode(raw) {
            Ok(event) => self.handle(handle, event),
            Err(e) => {
                self.hub.send_error(
                    handle,
                    ultra_proto::ErrorCode::BadRequest,
                    format!("malformed event: {e}"),
                );
                Flow::Continue
            }
        }
    }

    /// Tear down a session: release its alias, propagate offline presence,
    /// close the session row and drop transient state.
    pub fn disconnect(&self, handle: &Arc<SessionHandle>) {
        let session_id = handle.session_id.clone();
        self.limiter.remove_session(&session_id);
        self.hub.remove(&session_id);

        let (alias, color, public_key) = {
            let mut meta = handle.meta.write();
            meta.status = PresenceStatus::Offline;
            (meta.alias.take(), meta.color.take(), meta.device_public_key.clone())
        };

        if let Some(alias) = alias {
            self.store.release_alias(&alias);
            if let Some(color) = &color {
                self.hub.colors.release(color);
            }
            self.emit_presence(&alias, PresenceStatus::Offline, public_key, color);
            info!(session = %session_id, alias = %alias, "Alias released");
        }

        self.store.close_session(&session_id);
        info!(session = %session_id, "Session closed");
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    /// Broadcast a presence event for an alias to every live session.
    pub(crate) fn emit_presence(
        &self,
        alias: &str,
        status: PresenceStatus,
        public_key: Option<String>,
        color: Option<String>,
    ) {
        let channels = self.unbanned_channels(alias);
        self.hub.broadcast_all(ServerEvent::PresenceEvent(PresencePayload {
            alias: alias.to_string(),
            status,
            channels,
            public_key,
            color,
        }));
    }

    /// Presence emission sourced from a live session's own state.
    pub(crate) fn emit_presence_for(&self, handle: &SessionHandle) {
        let (alias, status, public_key, color) = {
            let meta = handle.meta.read();
            (meta.alias.clone(), meta.status, meta.device_public_key.clone(), meta.color.clone())
        };
        if let Some(alias) = alias {
            self.emit_presence(&alias, status, public_key, color);
        }
    }

    /// Channels an alias belongs to, with banned memberships filtered out.
    pub(crate) fn unbanned_channels(&self, alias: &str) -> Vec<String> {
        self.store
            .member_channels(alias)
            .into_iter()
            .filter(|channel| {
                self.store
                    .membership(channel, alias)
                    .is_some_and(|m| !m.is_banned)
            })
            .collect()
    }

    /// Send the requester its `network_snapshot`.
    pub(crate) fn send_snapshot(&self, handle: &SessionHandle, alias: &str) {
        let snapshot = self.store.network_snapshot(alias);
        self.hub.send(handle, ServerEvent::NetworkSnapshot(snapshot));
    }

    /// Broadcast a channel event to the channel's room.
    pub(crate) fn emit_channel_event(
        &self,
        channel: &str,
        kind: ChannelEventType,
        actor: &str,
        payload: serde_json::Value,
    ) {
        self.hub.broadcast_room(
            &crate::hub::channel_room(channel),
            ServerEvent::ChannelEvent(ChannelEventPayload {
                kind,
                channel: channel.to_string(),
                actor: actor.to_string(),
                payload,
                timestamp: now_ms(),
            }),
        );
    }

    /// Deliver an ephemeral system NOTICE to one session.
    ///
    /// The record is not persisted; it exists only as a `message_event` for
    /// the originator. It still consumes a sequence number so sequences stay
    /// unique per process.
    pub(crate) fn system_notice(
        &self,
        handle: &SessionHandle,
        channel: Option<String>,
        text: impl Into<String>,
    ) {
        let channel = channel
            .or_else(|| handle.first_channel())
            .unwrap_or_else(|| "#lobby".to_string());
        let record = self.ephemeral_record(
            Scope::Channel { channel },
            "ultra",
            MessageKind::Notice,
            text.into(),
        );
        self.hub.send(
            handle,
            ServerEvent::MessageEvent(MessageEventPayload {
                kind: MessageEventType::Created,
                scope: record.scope.clone(),
                message: record,
            }),
        );
    }

    /// Build a non-persisted message record.
    pub(crate) fn ephemeral_record(
        &self,
        scope: Scope,
        sender: &str,
        kind: MessageKind,
        body: String,
    ) -> MessageRecord {
        MessageRecord {
            message_id: Uuid::new_v4().to_string(),
            scope,
            sender_alias: sender.to_string(),
            sender_device_id: "gateway".to_string(),
            kind,
            body: Some(body),
            encrypted_payload: None,
            timestamp: now_ms(),
            reply_to: None,
            thread_id: None,
            reactions: Vec::new(),
            deleted_at: None,
            sequence: self.store.next_sequence(),
        }
    }

    /// Require the session's attached alias.
    pub(crate) fn require_alias(&self, handle: &SessionHandle) -> HandlerResult<String> {
        handle
            .alias()
            .ok_or_else(|| HandlerError::Unauthorized("claim an alias first".to_string()))
    }

    /// Force-leave every room and drop channel state for a kicked/banned
    /// member's live session, if one exists.
    pub(crate) fn force_leave_channel(&self, alias: &str, channel: &str) {
        if let Some(target) = self.hub.session_by_alias(alias) {
            target.meta.write().channels.retain(|c| c != channel);
            self.hub
                .leave_room(&crate::hub::channel_room(channel), &target.session_id);
        }
    }
}

fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::HelloDevice(_) => "hello_device",
        ClientEvent::ClaimAlias(_) => "claim_alias",
        ClientEvent::CommandExec(_) => "command_exec",
        ClientEvent::JoinChannel(_) => "join_channel",
        ClientEvent::PartChannel(_) => "part_channel",
        ClientEvent::SendChannelMessage(_) => "send_channel_message",
        ClientEvent::SendDmMessage(_) => "send_dm_message",
        ClientEvent::ReactToggle(_) => "react_toggle",
        ClientEvent::MessageEdit(_) => "message_edit",
        ClientEvent::MessageDelete(_) => "message_delete",
        ClientEvent::HistoryFetch(_) => "history_fetch",
        ClientEvent::TypingState(_) => "typing_state",
        ClientEvent::BotInvoke(_) => "bot_invoke",
    }
}

/// Fan-out rooms for a message's scope.
pub(crate) fn rooms_for_scope(scope: &Scope) -> Vec<String> {
    match scope {
        Scope::Channel { channel } => vec![crate::hub::channel_room(channel)],
        Scope::Thread { channel, .. } => channel
            .as_ref()
            .map(|c| vec![crate::hub::channel_room(c)])
            .unwrap_or_default(),
        Scope::Dm { convo_id } => convo_id
            .strip_prefix("dm:")
            .and_then(|pair| pair.split_once('|'))
            .map(|(a, b)| vec![alias_room(a), alias_room(b)])
            .unwrap_or_default(),
    }
}
