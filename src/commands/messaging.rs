//! Messaging commands: DMs, actions, notices, threads, search, bots.

use super::{Ctx, ParsedCommand};
use crate::dispatch::{messaging as dispatch_messaging, rooms_for_scope};
use crate::error::{HandlerError, HandlerResult};
use ultra_proto::envelope::{
    BotInvoke, MessageEventPayload, MessageEventType, SendChannelMessage,
};
use ultra_proto::{MessageKind, Scope, validate};

/// Search result cap for `/search`.
const SEARCH_LIMIT: usize = 8;

fn arg<'a>(cmd: &'a ParsedCommand, index: usize, what: &str) -> HandlerResult<&'a str> {
    cmd.args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| HandlerError::BadRequest(format!("usage: {what}")))
}

/// `/msg <alias> <text>`: the server-visible plaintext variant of a DM.
///
/// The text is delivered to both parties' alias rooms but never persisted;
/// stored DM history stays exclusively encrypted-envelope records.
pub(crate) fn msg(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/msg <alias> <text>")?.to_string();
    let text = cmd.rest_after(1);
    let text = validate::message_body(&text)
        .map_err(|e| HandlerError::BadRequest(format!("invalid message body: {e}")))?;

    if ctx.d.store.alias_record(&target).is_none() {
        return Err(HandlerError::BadRequest(format!("unknown alias: {target}")));
    }
    if !ctx
        .d
        .limiter
        .check(&ctx.handle.session_id, dispatch_messaging::preset_for(ctx.handle))
    {
        return Err(HandlerError::RateLimit);
    }

    let convo = ctx.d.store.get_or_create_dm_conversation(&alias, &target);
    let scope = Scope::Dm {
        convo_id: convo.convo_id,
    };
    let record = ctx
        .d
        .ephemeral_record(scope.clone(), &alias, MessageKind::Text, text);

    let rooms = rooms_for_scope(&scope);
    ctx.d.hub.publish_messages(&rooms, || MessageEventPayload {
        kind: MessageEventType::Created,
        scope,
        message: record,
    });
    Ok(())
}

/// `/me <action>`: ACTION-kind message in the current channel.
pub(crate) fn me(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    send_kind(ctx, cmd.raw_args.clone(), MessageKind::Action)
}

/// `/notice <text>`: NOTICE-kind message in the current channel.
pub(crate) fn notice(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    send_kind(ctx, cmd.raw_args.clone(), MessageKind::Notice)
}

fn send_kind(ctx: &Ctx<'_>, body: String, kind: MessageKind) -> HandlerResult {
    let channel = ctx.current_channel(None)?;
    dispatch_messaging::send_channel_message(
        ctx.d,
        ctx.handle,
        SendChannelMessage {
            channel,
            body,
            kind: Some(kind),
            reply_to: None,
            thread_id: None,
        },
    )
}

/// `/reply <msgId> <text>`: references the parent in its own scope.
pub(crate) fn reply(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let parent_id = arg(cmd, 0, "/reply <msgId> <text>")?.to_string();
    let text = cmd.rest_after(1);

    let parent = ctx
        .d
        .store
        .find_message(&parent_id)
        .ok_or_else(|| HandlerError::BadRequest("unknown message".to_string()))?;
    let channel = parent
        .scope
        .channel_name()
        .ok_or_else(|| {
            HandlerError::BadRequest("replies are limited to channel messages".to_string())
        })?
        .to_string();

    dispatch_messaging::send_channel_message(
        ctx.d,
        ctx.handle,
        SendChannelMessage {
            channel,
            body: text,
            kind: None,
            reply_to: Some(parent_id),
            thread_id: parent.thread_id,
        },
    )
}

/// `/thread <threadId> <text>`: thread-scoped message under the root's
/// channel.
pub(crate) fn thread(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let thread_id = arg(cmd, 0, "/thread <threadId> <text>")?.to_string();
    let text = cmd.rest_after(1);

    let root = ctx
        .d
        .store
        .find_message(&thread_id)
        .ok_or_else(|| HandlerError::BadRequest("unknown thread".to_string()))?;
    let channel = root
        .scope
        .channel_name()
        .ok_or_else(|| {
            HandlerError::BadRequest("threads are limited to channel messages".to_string())
        })?
        .to_string();

    dispatch_messaging::send_channel_message(
        ctx.d,
        ctx.handle,
        SendChannelMessage {
            channel,
            body: text,
            kind: None,
            reply_to: None,
            thread_id: Some(thread_id),
        },
    )
}

/// `/search <term>`: up to eight body-substring matches in the current
/// channel, answered as notices.
pub(crate) fn search(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let channel = ctx.current_channel(None)?;
    let term = cmd.raw_args.trim();
    if term.is_empty() {
        return Err(HandlerError::BadRequest("usage: /search <term>".to_string()));
    }

    let matches = ctx
        .d
        .store
        .search_channel_messages(&channel, term, SEARCH_LIMIT);
    if matches.is_empty() {
        ctx.d.system_notice(
            ctx.handle,
            Some(channel),
            format!("no matches for \"{term}\""),
        );
        return Ok(());
    }
    for record in matches {
        ctx.d.system_notice(
            ctx.handle,
            Some(channel.clone()),
            format!(
                "[{}] {}",
                record.sender_alias,
                record.body.unwrap_or_default()
            ),
        );
    }
    Ok(())
}

/// `/pin`, `/unpin`, `/clear`: acknowledged without server state mutation.
pub(crate) fn acknowledge(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    ctx.d.system_notice(
        ctx.handle,
        ctx.context_channel.clone(),
        format!("/{} acknowledged", cmd.name),
    );
    Ok(())
}

/// `/bot list` and `/bot run <botId> [args...]`.
pub(crate) fn bot(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    match arg(cmd, 0, "/bot list | /bot run <botId> [args...]")? {
        "list" => {
            for bot in ctx.d.store.list_bots() {
                ctx.d.system_notice(
                    ctx.handle,
                    ctx.context_channel.clone(),
                    format!("{} v{} ({})", bot.bot_id, bot.version, bot.name),
                );
            }
            Ok(())
        }
        "run" => {
            let bot_id = arg(cmd, 1, "/bot run <botId> [args...]")?.to_string();
            let args = cmd.args.get(2..).unwrap_or_default().to_vec();
            let channel = ctx.current_channel(None)?;
            crate::dispatch::bots::bot_invoke(
                ctx.d,
                ctx.handle,
                BotInvoke {
                    bot_id,
                    command: "run".to_string(),
                    args,
                    channel: Some(channel),
                },
            )
        }
        other => Err(HandlerError::BadRequest(format!(
            "unknown /bot subcommand: {other}"
        ))),
    }
}
