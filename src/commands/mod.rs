//! Slash-command interpreter.
//!
//! Commands compose dispatcher primitives; every role check resolves against
//! the current channel's membership. Unknown commands are a `BAD_REQUEST`.

pub mod messaging;
pub mod moderation;
pub mod parse;
pub mod presence;

pub use parse::{ParsedCommand, parse};

use crate::dispatch::{Dispatcher, Flow};
use crate::error::{HandlerError, HandlerResult};
use crate::hub::SessionHandle;
use std::sync::Arc;
use ultra_proto::envelope::{CommandExec, SendChannelMessage};
use ultra_proto::{Role, validate};

/// Interpreter context for one command execution.
pub(crate) struct Ctx<'a> {
    pub d: &'a Dispatcher,
    pub handle: &'a Arc<SessionHandle>,
    pub context_channel: Option<String>,
}

impl Ctx<'_> {
    /// Resolve the channel a command acts on: explicit argument, then the
    /// supplied context channel, then the session's first joined channel.
    pub fn current_channel(&self, explicit: Option<&str>) -> HandlerResult<String> {
        if let Some(name) = explicit {
            return validate::channel(name)
                .map_err(|e| HandlerError::BadRequest(format!("invalid channel name: {e}")));
        }
        self.context_channel
            .clone()
            .or_else(|| self.handle.first_channel())
            .ok_or_else(|| HandlerError::BadRequest("no channel context".to_string()))
    }

    /// Require the caller to hold at least `min` in `channel`.
    pub fn require_role(&self, channel: &str, alias: &str, min: Role) -> HandlerResult {
        let role = self
            .d
            .store
            .membership(channel, alias)
            .map(|m| m.role);
        if ultra_proto::roles::has_role_at_least(role, min) {
            Ok(())
        } else {
            Err(HandlerError::Forbidden(format!(
                "requires {} in {channel}",
                min.as_str()
            )))
        }
    }
}

/// Entry point for `command_exec`: slash input runs a command, anything else
/// is channel text for the context channel.
pub fn execute_raw(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: CommandExec,
) -> Result<Flow, HandlerError> {
    let context_channel = match &payload.context_channel {
        Some(name) => Some(
            validate::channel(name)
                .map_err(|e| HandlerError::BadRequest(format!("invalid channel name: {e}")))?,
        ),
        None => None,
    };

    match parse(&payload.raw) {
        Some(command) => {
            let ctx = Ctx {
                d,
                handle,
                context_channel,
            };
            execute(&ctx, command)
        }
        None => {
            let channel = context_channel
                .or_else(|| handle.first_channel())
                .ok_or_else(|| HandlerError::BadRequest("no channel context".to_string()))?;
            crate::dispatch::messaging::send_channel_message(
                d,
                handle,
                SendChannelMessage {
                    channel,
                    body: payload.raw,
                    kind: None,
                    reply_to: None,
                    thread_id: None,
                },
            )?;
            Ok(Flow::Continue)
        }
    }
}

/// Route one parsed command.
pub(crate) fn execute(ctx: &Ctx<'_>, cmd: ParsedCommand) -> Result<Flow, HandlerError> {
    match cmd.name.as_str() {
        "help" => presence::help(ctx),
        "nick" => presence::nick(ctx, &cmd),
        "whoami" => presence::whoami(ctx),
        "away" => presence::set_away(ctx, true),
        "back" => presence::set_away(ctx, false),
        "quit" => return Ok(Flow::Disconnect),
        "join" => presence::join(ctx, &cmd),
        "part" => presence::part(ctx, &cmd),
        "list" => presence::list(ctx),
        "names" => presence::names(ctx, &cmd),
        "who" => presence::who(ctx),
        "whois" => presence::whois(ctx, &cmd),
        "ignore" => presence::ignore(ctx, &cmd, true),
        "unignore" => presence::ignore(ctx, &cmd, false),
        "topic" => moderation::topic(ctx, &cmd),
        "mode" => moderation::mode(ctx, &cmd),
        "op" | "deop" | "voice" | "devoice" => moderation::role_change(ctx, &cmd),
        "ban" => moderation::ban(ctx, &cmd, true),
        "unban" => moderation::ban(ctx, &cmd, false),
        "mute" => moderation::mute(ctx, &cmd, true),
        "unmute" => moderation::mute(ctx, &cmd, false),
        "kick" => moderation::kick(ctx, &cmd),
        "invite" => moderation::invite(ctx, &cmd),
        "msg" => messaging::msg(ctx, &cmd),
        "me" => messaging::me(ctx, &cmd),
        "notice" => messaging::notice(ctx, &cmd),
        "reply" => messaging::reply(ctx, &cmd),
        "thread" => messaging::thread(ctx, &cmd),
        "search" => messaging::search(ctx, &cmd),
        "pin" | "unpin" | "clear" => messaging::acknowledge(ctx, &cmd),
        "bot" => messaging::bot(ctx, &cmd),
        other => {
            return Err(HandlerError::BadRequest(format!(
                "unknown command: /{other}"
            )));
        }
    }
    .map(|_| Flow::Continue)
}
