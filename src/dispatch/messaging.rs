//! Message lifecycle: send, edit, delete, react, history.

use super::{Dispatcher, rooms_for_scope};
use crate::error::{HandlerError, HandlerResult};
use crate::hub::SessionHandle;
use crate::security::RateLimitPreset;
use crate::store::{MessageDraft, now_ms};
use std::sync::Arc;
use ultra_proto::envelope::{
    HistoryFetch, HistorySnapshot, MessageDelete, MessageEdit, MessageEventPayload,
    MessageEventType, ReactToggle, SendChannelMessage, SendDmMessage,
};
use ultra_proto::{MessageKind, MessageRecord, Scope, ServerEvent, validate};

/// Default history page size.
const HISTORY_DEFAULT_LIMIT: usize = 50;

/// Classical-wire sessions run under the tighter compat preset.
pub(crate) fn preset_for(handle: &SessionHandle) -> RateLimitPreset {
    match handle.kind {
        crate::hub::SessionKind::Native => RateLimitPreset::GENERAL,
        crate::hub::SessionKind::Wire => RateLimitPreset::CLASSIC,
    }
}

/// `send_channel_message`: membership-, ban- and mute-gated insert plus
/// ordered fan-out to the channel room.
pub fn send_channel_message(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: SendChannelMessage,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let name = validate::channel(&payload.channel)
        .map_err(|e| HandlerError::BadRequest(format!("invalid channel name: {e}")))?;

    if d.store.channel(&name).is_none() {
        return Err(HandlerError::ChannelNotFound(name));
    }
    check_can_speak(d, &name, &alias)?;

    let body = validate::message_body(&payload.body)
        .map_err(|e| HandlerError::BadRequest(format!("invalid message body: {e}")))?;

    if !d
        .limiter
        .check(&handle.session_id, preset_for(handle))
    {
        return Err(HandlerError::RateLimit);
    }

    let scope = match &payload.thread_id {
        Some(thread_id) => Scope::Thread {
            thread_id: thread_id.clone(),
            channel: Some(name.clone()),
        },
        None => Scope::Channel {
            channel: name.clone(),
        },
    };
    let device_id = handle.meta.read().device_id.clone().unwrap_or_default();

    let rooms = rooms_for_scope(&scope);
    d.hub.publish_messages(&rooms, || {
        let record = d.store.insert_message(MessageDraft {
            scope,
            sender_alias: alias,
            sender_device_id: device_id,
            kind: payload.kind.unwrap_or(MessageKind::Text),
            body: Some(body),
            encrypted_payload: None,
            reply_to: payload.reply_to,
            thread_id: payload.thread_id,
            timestamp: None,
        });
        created_payload(record)
    });
    Ok(())
}

/// `send_dm_message`: opaque envelope relay into the deterministic convo,
/// fanned to both parties' alias rooms.
pub fn send_dm_message(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: SendDmMessage,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let (device_id, has_key) = {
        let meta = handle.meta.read();
        (
            meta.device_id.clone().unwrap_or_default(),
            meta.device_public_key.as_deref().is_some_and(|k| !k.is_empty()),
        )
    };
    if !has_key {
        return Err(HandlerError::Unauthorized(
            "device public key required for encrypted DMs".to_string(),
        ));
    }

    let target = validate::alias(&payload.target_alias)
        .map_err(|e| HandlerError::AliasInvalid(e.to_string()))?;
    if d.store.alias_record(&target).is_none() {
        return Err(HandlerError::BadRequest(format!("unknown alias: {target}")));
    }

    if !d
        .limiter
        .check(&handle.session_id, preset_for(handle))
    {
        return Err(HandlerError::RateLimit);
    }

    let convo = d.store.get_or_create_dm_conversation(&alias, &target);
    let scope = Scope::Dm {
        convo_id: convo.convo_id,
    };

    let rooms = rooms_for_scope(&scope);
    d.hub.publish_messages(&rooms, || {
        let record = d.store.insert_message(MessageDraft {
            scope,
            sender_alias: alias,
            sender_device_id: device_id,
            kind: MessageKind::Text,
            body: None,
            encrypted_payload: Some(payload.encrypted_payload),
            reply_to: None,
            thread_id: None,
            timestamp: None,
        });
        created_payload(record)
    });
    Ok(())
}

/// `react_toggle`: enforce the per-`(emoji, alias)` uniqueness invariant and
/// emit the resulting REACTION_* event on the message's scope.
pub fn react_toggle(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: ReactToggle,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let emoji = validate::text(&payload.emoji);
    if emoji.is_empty() {
        return Err(HandlerError::BadRequest("emoji is required".to_string()));
    }

    let record = d
        .store
        .find_message(&payload.message_id)
        .ok_or_else(|| HandlerError::BadRequest("unknown message".to_string()))?;
    authorize_scope(d, &alias, &record.scope)?;

    if !d
        .limiter
        .check(&handle.session_id, preset_for(handle))
    {
        return Err(HandlerError::RateLimit);
    }

    let (updated, added) = d
        .store
        .toggle_reaction(&payload.message_id, &alias, &emoji)
        .ok_or_else(|| HandlerError::BadRequest("message is deleted".to_string()))?;

    let kind = if added {
        MessageEventType::ReactionAdded
    } else {
        MessageEventType::ReactionRemoved
    };
    let rooms = rooms_for_scope(&updated.scope);
    d.hub.publish_messages(&rooms, || MessageEventPayload {
        kind,
        scope: updated.scope.clone(),
        message: updated,
    });
    Ok(())
}

/// `message_edit`: author-only body replacement; EDITED on the scope.
pub fn message_edit(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: MessageEdit,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let record = d
        .store
        .find_message(&payload.message_id)
        .ok_or_else(|| HandlerError::BadRequest("unknown message".to_string()))?;

    if record.sender_alias != alias {
        return Err(HandlerError::Forbidden(
            "only the author may edit a message".to_string(),
        ));
    }
    if record.encrypted_payload.is_some() {
        return Err(HandlerError::BadRequest(
            "encrypted messages cannot be edited".to_string(),
        ));
    }

    let body = validate::message_body(&payload.body)
        .map_err(|e| HandlerError::BadRequest(format!("invalid message body: {e}")))?;

    let updated = d
        .store
        .edit_message(&payload.message_id, &body)
        .ok_or_else(|| HandlerError::BadRequest("message is deleted".to_string()))?;

    let rooms = rooms_for_scope(&updated.scope);
    d.hub.publish_messages(&rooms, || MessageEventPayload {
        kind: MessageEventType::Edited,
        scope: updated.scope.clone(),
        message: updated,
    });
    Ok(())
}

/// `message_delete`: author-only tombstone; DELETED on the scope.
pub fn message_delete(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: MessageDelete,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let record = d
        .store
        .find_message(&payload.message_id)
        .ok_or_else(|| HandlerError::BadRequest("unknown message".to_string()))?;

    if record.sender_alias != alias {
        return Err(HandlerError::Forbidden(
            "only the author may delete a message".to_string(),
        ));
    }

    let updated = d
        .store
        .delete_message(&payload.message_id)
        .ok_or_else(|| HandlerError::BadRequest("unknown message".to_string()))?;

    let rooms = rooms_for_scope(&updated.scope);
    d.hub.publish_messages(&rooms, || MessageEventPayload {
        kind: MessageEventType::Deleted,
        scope: updated.scope.clone(),
        message: updated,
    });
    Ok(())
}

/// `history_fetch`: scope-authorized, clamped replay to the originator only.
pub fn history_fetch(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: HistoryFetch,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    authorize_scope(d, &alias, &payload.scope)?;

    let limit = payload
        .limit
        .map(|l| l as usize)
        .unwrap_or(HISTORY_DEFAULT_LIMIT);
    let messages = d.store.list_history(&payload.scope, limit, payload.before);

    d.hub.send(
        handle,
        ServerEvent::HistorySnapshot(HistorySnapshot {
            scope: payload.scope,
            messages,
        }),
    );
    Ok(())
}

// ============================================================================
// Shared checks
// ============================================================================

/// Membership, ban and mute gate for speaking into a channel.
pub(crate) fn check_can_speak(d: &Dispatcher, channel: &str, alias: &str) -> HandlerResult {
    let membership = d
        .store
        .membership(channel, alias)
        .ok_or_else(|| HandlerError::Forbidden(format!("join {channel} first")))?;
    if membership.is_banned {
        return Err(HandlerError::Forbidden(format!("banned from {channel}")));
    }
    if membership.muted_until.is_some_and(|until| until > now_ms()) {
        return Err(HandlerError::Forbidden(format!("muted in {channel}")));
    }
    Ok(())
}

/// Scope-level read/react authorization for an alias.
pub(crate) fn authorize_scope(d: &Dispatcher, alias: &str, scope: &Scope) -> HandlerResult {
    match scope {
        Scope::Channel { channel } => {
            if d.store.channel(channel).is_none() {
                return Err(HandlerError::ChannelNotFound(channel.clone()));
            }
            let membership = d
                .store
                .membership(channel, alias)
                .ok_or_else(|| HandlerError::Forbidden(format!("not a member of {channel}")))?;
            if membership.is_banned {
                return Err(HandlerError::Forbidden(format!("banned from {channel}")));
            }
            Ok(())
        }
        Scope::Dm { convo_id } => {
            let convo = d
                .store
                .dm_conversation(convo_id)
                .ok_or_else(|| HandlerError::BadRequest("unknown conversation".to_string()))?;
            if convo.alias_a != alias && convo.alias_b != alias {
                return Err(HandlerError::Forbidden(
                    "not a party to this conversation".to_string(),
                ));
            }
            Ok(())
        }
        Scope::Thread { channel, thread_id } => {
            // Resolve the owning channel through the thread root when the
            // fetch did not name it.
            let channel = channel.clone().or_else(|| {
                d.store
                    .find_message(thread_id)
                    .and_then(|root| root.scope.channel_name().map(str::to_string))
            });
            match channel {
                Some(channel) => authorize_scope(
                    d,
                    alias,
                    &Scope::Channel {
                        channel,
                    },
                ),
                None => Ok(()),
            }
        }
    }
}

fn created_payload(record: MessageRecord) -> MessageEventPayload {
    MessageEventPayload {
        kind: MessageEventType::Created,
        scope: record.scope.clone(),
        message: record,
    }
}
