//! Device handshake and alias claim/reclaim.

use super::Dispatcher;
use crate::error::{HandlerError, HandlerResult};
use crate::hub::{SessionHandle, alias_room};
use std::sync::Arc;
use tracing::info;
use ultra_proto::envelope::{AliasResult, ClaimAlias, HelloDevice, SessionReady};
use ultra_proto::{PresenceStatus, ServerEvent, validate};

/// `hello_device`: upsert the device, open the session row and answer with
/// `session_ready`.
pub fn hello_device(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: HelloDevice,
) -> HandlerResult {
    if payload.device_public_key.trim().is_empty() {
        return Err(HandlerError::BadRequest(
            "devicePublicKey is required".to_string(),
        ));
    }

    let device = d
        .store
        .upsert_device(payload.device_id.as_deref(), &payload.device_public_key);

    let ip = handle.meta.read().ip.clone();
    let session = d
        .store
        .create_session(&handle.session_id, &device.device_id, &ip);

    {
        let mut meta = handle.meta.write();
        meta.device_id = Some(device.device_id.clone());
        meta.device_public_key = Some(device.public_key.clone());
    }

    let known_alias = d.store.alias_for_device(&device.device_id);
    info!(
        session = %handle.session_id,
        device = %device.device_id,
        alias = ?known_alias,
        "Device handshake complete"
    );

    d.hub.send(
        handle,
        ServerEvent::SessionReady(SessionReady {
            device_id: device.device_id,
            alias: known_alias,
            resume_token: session.resume_token,
            motd: d.config.motd.clone(),
        }),
    );
    Ok(())
}

/// `claim_alias`: validate, resolve live-holder conflicts, verify device or
/// reclaim nonce, then attach the alias and announce it.
pub fn claim_alias(
    d: &Dispatcher,
    handle: &Arc<SessionHandle>,
    payload: ClaimAlias,
) -> HandlerResult {
    let alias = validate::alias(&payload.alias)
        .map_err(|e| HandlerError::AliasInvalid(e.to_string()))?;

    let (device_id, ip, previous_alias) = {
        let meta = handle.meta.read();
        (meta.device_id.clone(), meta.ip.clone(), meta.alias.clone())
    };
    let device_id = device_id
        .ok_or_else(|| HandlerError::Unauthorized("device handshake required".to_string()))?;

    if previous_alias.as_deref() == Some(alias.as_str()) {
        return Err(HandlerError::BadRequest(format!(
            "alias {alias} is already attached to this session"
        )));
    }

    // A live holder on a different IP blocks the claim outright. A holder on
    // the same IP is treated as this client's own ghost and disconnected.
    if let Some(holder) = d.hub.session_by_alias(&alias)
        && holder.session_id != handle.session_id
    {
        let holder_ip = holder.meta.read().ip.clone();
        if holder_ip != ip {
            return Err(HandlerError::AliasInUse(alias));
        }
        info!(alias = %alias, session = %holder.session_id, "Ghost session displaced by reclaim");
        d.disconnect(&holder);
        holder.kill.notify_waiters();
    }

    let record = d
        .store
        .claim_alias(
            &alias,
            &device_id,
            &handle.session_id,
            &ip,
            payload.reclaim_nonce.as_deref(),
        )
        .map_err(|_| {
            HandlerError::Unauthorized("alias is bound to another device; reclaim nonce required".to_string())
        })?;

    // Moving off a previous alias releases it and announces it offline.
    if let Some(old_alias) = previous_alias {
        d.store.release_alias(&old_alias);
        d.hub.leave_room(&alias_room(&old_alias), &handle.session_id);
        let old_color = handle.meta.write().color.take();
        if let Some(color) = &old_color {
            d.hub.colors.release(color);
        }
        let public_key = handle.meta.read().device_public_key.clone();
        d.emit_presence(&old_alias, PresenceStatus::Offline, public_key, old_color);
    }

    let color = d.hub.colors.assign(&alias, &ip);
    let first_alias = {
        let mut meta = handle.meta.write();
        meta.alias = Some(alias.clone());
        meta.color = Some(color.clone());
        meta.status = PresenceStatus::Online;
        let first = !meta.had_alias;
        meta.had_alias = true;
        first
    };
    d.hub.join_room(&alias_room(&alias), &handle.session_id);

    d.store.insert_audit_event(
        "alias.claim",
        &alias,
        serde_json::json!({ "deviceId": device_id, "ip": ip }),
    );
    info!(session = %handle.session_id, alias = %alias, "Alias claimed");

    if first_alias
        && let Err(e) = super::channel::join_channel(d, handle, "#lobby")
    {
        info!(alias = %alias, error = %e, "Lobby auto-join skipped");
    }

    d.hub.send(
        handle,
        ServerEvent::AliasResult(AliasResult {
            ok: true,
            alias: Some(alias.clone()),
            reclaim_nonce: Some(record.reclaim_nonce),
            error_key: None,
            message: None,
        }),
    );
    d.emit_presence_for(handle);
    d.send_snapshot(handle, &alias);
    Ok(())
}
