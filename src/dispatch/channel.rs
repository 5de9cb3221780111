//! Channel join/part and typing propagation.

use super::Dispatcher;
use crate::error::{HandlerError, HandlerResult};
use crate::hub::{SessionHandle, channel_room};
use std::sync::Arc;
use tracing::info;
use ultra_proto::envelope::{ChannelEventType, TypingState};
use ultra_proto::{Role, Scope, validate};

/// `join_channel`: create-if-missing (creator becomes OWNER), add the
/// membership, enter the room and announce.
pub fn join_channel(d: &Dispatcher, handle: &Arc<SessionHandle>, channel: &str) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let name = validate::channel(channel)
        .map_err(|e| HandlerError::BadRequest(format!("invalid channel name: {e}")))?;

    let (_, created) = d.store.ensure_channel(&name, &alias);
    let role_if_new = if created { Role::Owner } else { Role::Member };
    let membership = d.store.upsert_membership(&name, &alias, role_if_new);
    if membership.is_banned {
        return Err(HandlerError::Forbidden(format!("banned from {name}")));
    }

    {
        let mut meta = handle.meta.write();
        if !meta.channels.contains(&name) {
            meta.channels.push(name.clone());
        }
    }
    d.hub.join_room(&channel_room(&name), &handle.session_id);

    if created {
        info!(channel = %name, owner = %alias, "Channel created");
        d.emit_channel_event(
            &name,
            ChannelEventType::Created,
            &alias,
            serde_json::json!({ "name": name }),
        );
    }
    d.emit_channel_event(
        &name,
        ChannelEventType::Joined,
        &alias,
        serde_json::json!({ "role": membership.role }),
    );
    d.emit_presence_for(handle);
    d.send_snapshot(handle, &alias);
    Ok(())
}

/// `part_channel`: drop the membership, leave the room and announce.
pub fn part_channel(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    channel: &str,
    reason: Option<&str>,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let name = validate::channel(channel)
        .map_err(|e| HandlerError::BadRequest(format!("invalid channel name: {e}")))?;

    if d.store.channel(&name).is_none() {
        return Err(HandlerError::ChannelNotFound(name));
    }
    if !d.store.part_membership(&name, &alias) {
        return Err(HandlerError::BadRequest(format!("not a member of {name}")));
    }

    // Announce while the parting session still observes the room.
    d.emit_channel_event(
        &name,
        ChannelEventType::Parted,
        &alias,
        serde_json::json!({ "reason": reason }),
    );

    handle.meta.write().channels.retain(|c| c != &name);
    d.hub.leave_room(&channel_room(&name), &handle.session_id);

    d.emit_presence_for(handle);
    d.send_snapshot(handle, &alias);
    Ok(())
}

/// `typing_state`: channel-scoped only; fans a MEMBER_UPDATED to the room.
pub fn typing_state(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: TypingState,
) -> HandlerResult {
    let alias = d.require_alias(handle)?;
    let Scope::Channel { channel } = &payload.scope else {
        return Err(HandlerError::BadRequest(
            "typing state is channel-scoped".to_string(),
        ));
    };

    let membership = d
        .store
        .membership(channel, &alias)
        .ok_or_else(|| HandlerError::Forbidden(format!("not a member of {channel}")))?;
    if membership.is_banned {
        return Err(HandlerError::Forbidden(format!("banned from {channel}")));
    }

    d.emit_channel_event(
        channel,
        ChannelEventType::MemberUpdated,
        &alias,
        serde_json::json!({ "alias": alias, "typing": payload.active }),
    );
    Ok(())
}
