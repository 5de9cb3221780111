//! Presence, discovery and session commands.

use super::{Ctx, ParsedCommand};
use crate::dispatch::{channel as channels, session as sessions};
use crate::error::{HandlerError, HandlerResult};
use ultra_proto::PresenceStatus;
use ultra_proto::envelope::ClaimAlias;

const HELP_TEXT: &str = "commands: /help /nick /whoami /away /back /quit /join /part /list \
/names /who /whois /topic /mode /op /deop /voice /devoice /ban /unban /mute /unmute /kick \
/invite /msg /me /notice /reply /thread /ignore /unignore /search /pin /unpin /clear /bot";

fn status_str(status: PresenceStatus) -> &'static str {
    match status {
        PresenceStatus::Online => "online",
        PresenceStatus::Away => "away",
        PresenceStatus::Offline => "offline",
    }
}

fn arg<'a>(cmd: &'a ParsedCommand, index: usize, what: &str) -> HandlerResult<&'a str> {
    cmd.args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| HandlerError::BadRequest(format!("usage: {what}")))
}

pub(crate) fn help(ctx: &Ctx<'_>) -> HandlerResult {
    ctx.d.system_notice(ctx.handle, ctx.context_channel.clone(), HELP_TEXT);
    Ok(())
}

/// `/nick <alias>` re-runs the alias claim.
pub(crate) fn nick(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let alias = arg(cmd, 0, "/nick <alias>")?;
    sessions::claim_alias(
        ctx.d,
        ctx.handle,
        ClaimAlias {
            alias: alias.to_string(),
            reclaim_nonce: None,
        },
    )
}

pub(crate) fn whoami(ctx: &Ctx<'_>) -> HandlerResult {
    let alias = ctx.d.require_alias(ctx.handle)?;
    let ip = ctx.handle.meta.read().ip.clone();
    ctx.d.system_notice(
        ctx.handle,
        ctx.context_channel.clone(),
        format!("you are {alias} ({ip})"),
    );
    Ok(())
}

pub(crate) fn set_away(ctx: &Ctx<'_>, away: bool) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    ctx.handle.meta.write().status = if away {
        PresenceStatus::Away
    } else {
        PresenceStatus::Online
    };
    ctx.d.emit_presence_for(ctx.handle);
    Ok(())
}

pub(crate) fn join(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let channel = arg(cmd, 0, "/join #channel")?;
    channels::join_channel(ctx.d, ctx.handle, channel)
}

/// `/part [#c [reason]]`.
pub(crate) fn part(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    let channel = ctx.current_channel(cmd.args.first().map(String::as_str))?;
    let reason = cmd.rest_after(1);
    let reason = (!reason.is_empty()).then_some(reason);
    channels::part_channel(ctx.d, ctx.handle, &channel, reason.as_deref())
}

pub(crate) fn list(ctx: &Ctx<'_>) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let mut channels = ctx.d.store.channels_with_counts();
    channels.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    if channels.is_empty() {
        ctx.d
            .system_notice(ctx.handle, ctx.context_channel.clone(), "no channels yet");
        return Ok(());
    }
    for (channel, count) in channels {
        ctx.d.system_notice(
            ctx.handle,
            ctx.context_channel.clone(),
            format!("{} ({count}): {}", channel.name, channel.topic),
        );
    }
    Ok(())
}

/// `/names [#c]` lists members as `alias[ROLE]`; banned rows are filtered.
pub(crate) fn names(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let channel = ctx.current_channel(cmd.args.first().map(String::as_str))?;
    if ctx.d.store.channel(&channel).is_none() {
        return Err(HandlerError::ChannelNotFound(channel));
    }
    let listing: Vec<String> = ctx
        .d
        .store
        .channel_members(&channel)
        .into_iter()
        .filter(|(_, m)| !m.is_banned)
        .map(|(alias, m)| format!("{alias}[{}]", m.role.as_str()))
        .collect();
    ctx.d.system_notice(
        ctx.handle,
        Some(channel.clone()),
        format!("{channel}: {}", listing.join(" ")),
    );
    Ok(())
}

pub(crate) fn who(ctx: &Ctx<'_>) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let live: Vec<String> = ctx
        .d
        .hub
        .live_aliases()
        .into_iter()
        .map(|(alias, status)| format!("{alias} ({})", status_str(status)))
        .collect();
    ctx.d.system_notice(
        ctx.handle,
        ctx.context_channel.clone(),
        format!("online: {}", live.join(", ")),
    );
    Ok(())
}

/// `/whois <alias>`: status and channels for a live alias.
pub(crate) fn whois(ctx: &Ctx<'_>, cmd: &ParsedCommand) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/whois <alias>")?;
    let session = ctx
        .d
        .hub
        .session_by_alias(target)
        .ok_or_else(|| HandlerError::BadRequest(format!("{target} is offline")))?;
    let (status, channels) = {
        let meta = session.meta.read();
        (meta.status, meta.channels.join(", "))
    };
    ctx.d.system_notice(
        ctx.handle,
        ctx.context_channel.clone(),
        format!("{target} is {}; channels: {channels}", status_str(status)),
    );
    Ok(())
}

/// `/ignore` and `/unignore`: session-local outbound filter.
pub(crate) fn ignore(ctx: &Ctx<'_>, cmd: &ParsedCommand, add: bool) -> HandlerResult {
    ctx.d.require_alias(ctx.handle)?;
    let target = arg(cmd, 0, "/ignore <alias>")?;
    let changed = {
        let mut meta = ctx.handle.meta.write();
        if add {
            meta.ignored.insert(target.to_string())
        } else {
            meta.ignored.remove(target)
        }
    };
    let verb = match (add, changed) {
        (true, true) => "now ignoring",
        (true, false) => "already ignoring",
        (false, true) => "no longer ignoring",
        (false, false) => "was not ignoring",
    };
    ctx.d.system_notice(
        ctx.handle,
        ctx.context_channel.clone(),
        format!("{verb} {target}"),
    );
    Ok(())
}
