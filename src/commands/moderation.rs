//! Role-gated moderation commands.
//!
//! All role checks resolve against the acting alias's membership in the
//! target channel; refusals reach the originator only.

use super::{Ctx, ParsedCommand};
use crate::error::{HandlerError, HandlerResult};
use crate::store::now_ms;
use crate::store::types::ModerationType;
use ultra_proto::envelope::{ChannelEventPayload, ChannelEventType, ModerationPayload};
use ultra_proto::{ChannelMode, Role, ServerEvent, roles};

/// Mute duration applied by `/mute`.
const MUTE_MS: i64 = 10 * 60 * 1_000;

fn arg<'a>(cmd: &'a ParsedCommand, index: usize, what: &str) -> HandlerResult<&'a str> {
    cmd.args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| HandlerError::BadRequest(format!("usage: {what}")))
}

/// Record the action, audit it, and fan a `moderation_event` to the channel
/// room and the target's alias room.
fn log_and_emit(
    ctx: &Ctx<'_>,
    action: ModerationType,
    actor: &str,
    target: &str,
    channel: &str,
    reason: Option<&str>,
) {
    ctx.d
        .store
        .insert_moderation_action(actor, target, channel, action, reason);
    ctx.d.store.insert_audit_event(
        "moderation",
        actor,
        serde_json::json!({
            "action": action.as_str(),
            "target": target,
            "channel": channel,
            "reason": reason,
        }),
    );

    let event = ServerEvent::ModerationEvent(ModerationPayload {
        action: action.as_str().to_string(),
        actor: actor.to_string(),
        target: target.to_string(),
        channel: channel.to_string(),
        reason: reason.map(str::to_string),
        timestamp: now_ms(),
    });
    ctx.d
        .hub
        .broadcast_room(&crate::hub::channel_room(channel), event.clone());
    ctx.d.hub.broadcast_room(&crate::hub::alias_room(target), event);
}

fn require_member(ctx: &Ctx<'_>, channel: &str, target: &str) -> HandlerResult {
    if ctx.d.store.membership(channel, target).is_none() {
        return Err(HandlerError::BadRequest(format!(
            "{target} is not in {channel}"
        )));
    }
    Ok(())
}

/// `/topic #c [text]`: read, or set with OP.
pub(crate) fn topic(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let channel = ctx.current_channel(cmd.args.first().map(String::as_str))?;
    let row = ctx
        .d
        .store
        .channel(&channel)
        .ok_or_else(|| HandlerError::ChannelNotFound(channel.clone()))?;

    let text = cmd.rest_after(1);
    if text.is_empty() {
        let current = if row.topic.is_empty() {
            format!("{channel} has no topic")
        } else {
            format!("{channel} topic: {}", row.topic)
        };
        ctx.d.system_notice(ctx.handle, Some(channel), current);
        return Ok(());
    }

    ctx.require_role(&channel, &alias, Role::Op)?;
    ctx.d.store.set_channel_topic(&channel, &text);
    ctx.d.emit_channel_event(
        &channel,
        ChannelEventType::TopicChanged,
        &alias,
        serde_json::json!({ "topic": text }),
    );
    Ok(())
}

/// `/mode #c +X|-X`: set or clear one flag with OP; emits the full set.
pub(crate) fn mode(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let channel = ctx.current_channel(Some(arg(cmd, 0, "/mode #c +X|-X")?))?;
    let flag = arg(cmd, 1, "/mode #c +X|-X")?;

    let enable = match flag.chars().next() {
        Some('+') => true,
        Some('-') => false,
        _ => {
            return Err(HandlerError::BadRequest(
                "mode must be signed, e.g. +m or -m".to_string(),
            ));
        }
    };
    let mode = ChannelMode::from_flag(&flag[1..])
        .ok_or_else(|| HandlerError::BadRequest(format!("unknown mode flag: {flag}")))?;

    if ctx.d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    ctx.require_role(&channel, &alias, Role::Op)?;

    let modes = ctx
        .d
        .store
        .set_channel_mode(&channel, mode, enable)
        .ok_or_else(|| HandlerError::ChannelNotFound(channel.clone()))?;
    ctx.d.emit_channel_event(
        &channel,
        ChannelEventType::ModeChanged,
        &alias,
        serde_json::json!({ "modes": modes }),
    );
    Ok(())
}

/// `/op`, `/deop`, `/voice`, `/devoice <alias> [#c]`.
pub(crate) fn role_change(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/op <alias> [#c]")?.to_string();
    let channel = ctx.current_channel(cmd.args.get(1).map(String::as_str))?;
    let role = roles::role_from_mode(&cmd.name)
        .ok_or_else(|| HandlerError::BadRequest(format!("unknown command: /{}", cmd.name)))?;

    if ctx.d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    ctx.require_role(&channel, &alias, Role::Op)?;
    require_member(ctx, &channel, &target)?;

    ctx.d.store.set_member_role(&channel, &target, role);
    ctx.d.emit_channel_event(
        &channel,
        ChannelEventType::MemberUpdated,
        &alias,
        serde_json::json!({ "alias": target, "role": role }),
    );
    log_and_emit(ctx, ModerationType::RoleSet, &alias, &target, &channel, None);
    Ok(())
}

/// `/ban` and `/unban <alias> #c [reason]`.
pub(crate) fn ban(ctx: &Ctx<'_>, cmd: &ParsedCommand, banned: bool) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/ban <alias> #c [reason]")?.to_string();
    let channel = ctx.current_channel(cmd.args.get(1).map(String::as_str))?;
    let reason = cmd.rest_after(2);
    let reason = (!reason.is_empty()).then_some(reason);

    if ctx.d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    ctx.require_role(&channel, &alias, Role::Op)?;
    require_member(ctx, &channel, &target)?;

    ctx.d.store.set_member_ban(&channel, &target, banned);
    if banned {
        // A banned member stops observing the room; the row is retained.
        ctx.d.force_leave_channel(&target, &channel);
    }
    log_and_emit(
        ctx,
        if banned {
            ModerationType::Ban
        } else {
            ModerationType::Unban
        },
        &alias,
        &target,
        &channel,
        reason.as_deref(),
    );
    Ok(())
}

/// `/mute` and `/unmute <alias> #c`; mutes last ten minutes.
pub(crate) fn mute(ctx: &Ctx<'_>, cmd: &ParsedCommand, muted: bool) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/mute <alias> #c")?.to_string();
    let channel = ctx.current_channel(cmd.args.get(1).map(String::as_str))?;

    if ctx.d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    ctx.require_role(&channel, &alias, Role::Op)?;
    require_member(ctx, &channel, &target)?;

    let until = muted.then(|| now_ms() + MUTE_MS);
    ctx.d.store.set_member_mute(&channel, &target, until);
    log_and_emit(
        ctx,
        if muted {
            ModerationType::Mute
        } else {
            ModerationType::Unmute
        },
        &alias,
        &target,
        &channel,
        None,
    );
    Ok(())
}

/// `/kick <alias> #c [reason]`: removes the membership and forces the
/// target's live session out of the room.
pub(crate) fn kick(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/kick <alias> #c [reason]")?.to_string();
    let channel = ctx.current_channel(cmd.args.get(1).map(String::as_str))?;
    let reason = cmd.rest_after(2);
    let reason = (!reason.is_empty()).then_some(reason);

    if ctx.d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    ctx.require_role(&channel, &alias, Role::Op)?;
    require_member(ctx, &channel, &target)?;

    // Announce while the target still observes the room.
    ctx.d.emit_channel_event(
        &channel,
        ChannelEventType::Kicked,
        &alias,
        serde_json::json!({ "alias": target, "reason": reason }),
    );

    ctx.d.store.part_membership(&channel, &target);
    ctx.d.force_leave_channel(&target, &channel);
    log_and_emit(
        ctx,
        ModerationType::Kick,
        &alias,
        &target,
        &channel,
        reason.as_deref(),
    );
    Ok(())
}

/// `/invite <alias> #c`: INVITED to the channel room and the target's alias
/// room; no membership change.
pub(crate) fn invite(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/invite <alias> #c")?.to_string();
    let channel = ctx.current_channel(cmd.args.get(1).map(String::as_str))?;

    if ctx.d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    ctx.require_role(&channel, &alias, Role::Op)?;

    let payload = ChannelEventPayload {
        kind: ChannelEventType::Invited,
        channel: channel.clone(),
        actor: alias.clone(),
        payload: serde_json::json!({ "alias": target }),
        timestamp: now_ms(),
    };
    ctx.d.hub.broadcast_room(
        &crate::hub::channel_room(&channel),
        ServerEvent::ChannelEvent(payload.clone()),
    );
    ctx.d.hub.broadcast_room(
        &crate::hub::alias_room(&target),
        ServerEvent::ChannelEvent(payload),
    );
    Ok(())
}
