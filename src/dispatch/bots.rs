//! Bot invocation surface.
//!
//! The bot-runner is an external collaborator; the gateway only produces the
//! `bot_event` and its mirrored NOTICE. The seeded `echo` bot is answered
//! gateway-side so a bare deployment has something to talk to.

use super::Dispatcher;
use crate::error::{HandlerError, HandlerResult};
use crate::hub::SessionHandle;
use crate::store::{MessageDraft, now_ms};
use std::sync::Arc;
use tracing::info;
use ultra_proto::envelope::{
    BotEventPayload, BotInvoke, MessageEventPayload, MessageEventType,
};
use ultra_proto::{MessageKind, Scope, ServerEvent, validate};

/// `bot_invoke`: emit a `bot_event` into the target channel room plus a
/// mirrored NOTICE-kind message.
pub fn bot_invoke(d: &Dispatcher, handle: &Arc<SessionHandle>, payload: BotInvoke) -> HandlerResult {
    let alias = d.require_alias(handle)?;

    let channel = match &payload.channel {
        Some(channel) => validate::channel(channel)
            .map_err(|e| HandlerError::BadRequest(format!("invalid channel name: {e}")))?,
        None => handle
            .first_channel()
            .ok_or_else(|| HandlerError::BadRequest("no channel context".to_string()))?,
    };
    if d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    super::messaging::check_can_speak(d, &channel, &alias)?;

    let bot = d
        .store
        .find_bot(&payload.bot_id)
        .ok_or_else(|| HandlerError::BadRequest(format!("unknown bot: {}", payload.bot_id)))?;

    if !d
        .limiter
        .check(&handle.session_id, super::messaging::preset_for(handle))
    {
        return Err(HandlerError::RateLimit);
    }

    let output = if bot.bot_id == "echo" {
        if payload.args.is_empty() {
            payload.command.clone()
        } else {
            payload.args.join(" ")
        }
    } else {
        format!("{} acknowledged {}", bot.name, payload.command)
    };

    info!(bot = %bot.bot_id, channel = %channel, actor = %alias, "Bot invoked");
    d.store.insert_audit_event(
        "bot.invoke",
        &alias,
        serde_json::json!({
            "botId": bot.bot_id,
            "channel": channel,
            "command": payload.command,
            "args": payload.args,
        }),
    );

    d.hub.broadcast_room(
        &crate::hub::channel_room(&channel),
        ServerEvent::BotEvent(BotEventPayload {
            bot_id: bot.bot_id.clone(),
            channel: channel.clone(),
            output: output.clone(),
            timestamp: now_ms(),
        }),
    );

    let device_id = handle.meta.read().device_id.clone().unwrap_or_default();
    let rooms = vec![crate::hub::channel_room(&channel)];
    d.hub.publish_messages(&rooms, || {
        let record = d.store.insert_message(MessageDraft {
            scope: Scope::Channel { channel },
            sender_alias: alias,
            sender_device_id: device_id,
            kind: MessageKind::Notice,
            body: Some(output),
            encrypted_payload: None,
            reply_to: None,
            thread_id: None,
            timestamp: None,
        });
        MessageEventPayload {
            kind: MessageEventType::Created,
            scope: record.scope.clone(),
            message: record,
        }
    });
    Ok(())
}
