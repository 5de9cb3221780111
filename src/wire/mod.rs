//! Classical-wire adaptor.
//!
//! Line-framed endpoint at `/webirc` speaking a small verb subset (`PING`,
//! `NICK`, `JOIN`, `LIST`, `PRIVMSG`) with three-digit numeric replies. Wire
//! sessions enter the same rooms as native sessions; channel `PRIVMSG`
//! inserts a real message record and fans out to the shared channel room,
//! while native `message_event CREATED` traffic is re-encoded for the wire
//! as prefixed `PRIVMSG` lines.

use crate::dispatch::{Dispatcher, messaging as dispatch_messaging};
use crate::error::HandlerError;
use crate::hub::{SessionHandle, SessionKind, alias_room};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use ultra_proto::envelope::{MessageEventType, SendChannelMessage};
use ultra_proto::line::{Numeric, WireCommand, numeric, parse_line, pong, privmsg};
use ultra_proto::{PresenceStatus, ServerEvent, validate};
use uuid::Uuid;

/// Server name used in numeric prefixes.
const WIRE_SERVER: &str = "ultra";

/// Protocol state for one classical-wire connection.
pub struct WireSession {
    dispatcher: Arc<Dispatcher>,
    handle: Arc<SessionHandle>,
}

impl WireSession {
    /// Attach wire protocol state to a registered session handle.
    ///
    /// The classical endpoint has no device handshake, so a device row keyed
    /// by the client host is synthesized before any NICK claim; reconnecting
    /// from the same host reclaims the same nicks without a nonce.
    pub fn new(dispatcher: Arc<Dispatcher>, handle: Arc<SessionHandle>) -> Self {
        let ip = handle.meta.read().ip.clone();
        let device = dispatcher.store.upsert_device(Some(&format!("wire:{ip}")), "");
        dispatcher
            .store
            .create_session(&handle.session_id, &device.device_id, &ip);
        handle.meta.write().device_id = Some(device.device_id);
        Self { dispatcher, handle }
    }

    fn nick(&self) -> Option<String> {
        self.handle.alias()
    }

    fn nick_or_star(&self) -> String {
        self.nick().unwrap_or_else(|| "*".to_string())
    }

    /// Handle one inbound line, returning the reply lines.
    pub fn handle_line(&self, line: &str) -> Vec<String> {
        let Some(command) = parse_line(line) else {
            return Vec::new();
        };
        match command {
            WireCommand::Ping { token } => vec![pong(WIRE_SERVER, token.as_deref())],
            WireCommand::Nick { nick } => self.handle_nick(nick),
            WireCommand::Join { channel } => self.handle_join(channel),
            WireCommand::List => self.handle_list(),
            WireCommand::Privmsg { target, text } => self.handle_privmsg(target, text),
            WireCommand::Unknown { verb } => {
                debug!(session = %self.handle.session_id, %verb, "Unrecognized wire verb");
                Vec::new()
            }
        }
    }

    fn handle_nick(&self, nick: Option<String>) -> Vec<String> {
        let me = self.nick_or_star();
        let Some(nick) = nick else {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNeedMoreParams,
                &me,
                &["NICK"],
                "Not enough parameters",
            )];
        };

        let alias = match validate::alias(&nick) {
            Ok(alias) => alias,
            Err(_) => {
                return vec![numeric(
                    WIRE_SERVER,
                    Numeric::ErrErroneousNickname,
                    &me,
                    &[&nick],
                    "Erroneous nickname",
                )];
            }
        };

        let d = &self.dispatcher;
        let in_use = d
            .hub
            .session_by_alias(&alias)
            .is_some_and(|holder| holder.session_id != self.handle.session_id);
        if in_use {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNicknameInUse,
                &me,
                &[&alias],
                "Nickname is already in use",
            )];
        }

        let (device_id, ip, previous) = {
            let meta = self.handle.meta.read();
            (
                meta.device_id.clone().unwrap_or_default(),
                meta.ip.clone(),
                meta.alias.clone(),
            )
        };

        // The wire surface cannot carry a reclaim nonce, so a foreign-device
        // alias claim is indistinguishable from a collision.
        if d.store
            .claim_alias(&alias, &device_id, &self.handle.session_id, &ip, None)
            .is_err()
        {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNicknameInUse,
                &me,
                &[&alias],
                "Nickname is already in use",
            )];
        }

        if let Some(old) = previous {
            d.store.release_alias(&old);
            d.hub.leave_room(&alias_room(&old), &self.handle.session_id);
            let old_color = self.handle.meta.write().color.take();
            if let Some(color) = &old_color {
                d.hub.colors.release(color);
            }
            d.emit_presence(&old, PresenceStatus::Offline, None, old_color);
        }

        let color = d.hub.colors.assign(&alias, &ip);
        {
            let mut meta = self.handle.meta.write();
            meta.alias = Some(alias.clone());
            meta.color = Some(color);
            meta.had_alias = true;
            meta.status = PresenceStatus::Online;
        }
        d.hub.join_room(&alias_room(&alias), &self.handle.session_id);
        d.store.insert_audit_event(
            "alias.claim",
            &alias,
            serde_json::json!({ "deviceId": device_id, "ip": ip, "endpoint": "wire" }),
        );
        d.emit_presence_for(&self.handle);
        info!(session = %self.handle.session_id, alias = %alias, "Wire nick registered");

        vec![numeric(
            WIRE_SERVER,
            Numeric::RplWelcome,
            &alias,
            &[],
            &format!("Welcome to Ultra IRC {alias}"),
        )]
    }

    fn handle_join(&self, channel: Option<String>) -> Vec<String> {
        let me = self.nick_or_star();
        if self.nick().is_none() {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNeedMoreParams,
                &me,
                &["JOIN"],
                "Register a nickname first",
            )];
        }
        let Some(channel) = channel else {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNeedMoreParams,
                &me,
                &["JOIN"],
                "Not enough parameters",
            )];
        };

        match crate::dispatch::channel::join_channel(&self.dispatcher, &self.handle, &channel) {
            Ok(()) => {
                let name = channel.trim().to_lowercase();
                let names: Vec<String> = self
                    .dispatcher
                    .store
                    .channel_members(&name)
                    .into_iter()
                    .filter(|(_, m)| !m.is_banned)
                    .map(|(alias, _)| alias)
                    .collect();
                vec![
                    numeric(
                        WIRE_SERVER,
                        Numeric::RplNamReply,
                        &me,
                        &["=", &name],
                        &names.join(" "),
                    ),
                    numeric(
                        WIRE_SERVER,
                        Numeric::RplEndOfNames,
                        &me,
                        &[&name],
                        "End of /NAMES list",
                    ),
                ]
            }
            Err(e) => vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNeedMoreParams,
                &me,
                &["JOIN"],
                &e.to_string(),
            )],
        }
    }

    fn handle_list(&self) -> Vec<String> {
        let me = self.nick_or_star();
        let mut channels = self.dispatcher.store.channels_with_counts();
        channels.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        let mut replies: Vec<String> = channels
            .into_iter()
            .map(|(channel, count)| {
                numeric(
                    WIRE_SERVER,
                    Numeric::RplList,
                    &me,
                    &[&channel.name, &count.to_string()],
                    &channel.topic,
                )
            })
            .collect();
        replies.push(numeric(
            WIRE_SERVER,
            Numeric::RplListEnd,
            &me,
            &[],
            "End of /LIST",
        ));
        replies
    }

    fn handle_privmsg(&self, target: Option<String>, text: Option<String>) -> Vec<String> {
        let me = self.nick_or_star();
        let Some(target) = target else {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNeedMoreParams,
                &me,
                &["PRIVMSG"],
                "Not enough parameters",
            )];
        };
        let text = text.unwrap_or_default();
        if text.trim().is_empty() {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNoTextToSend,
                &me,
                &[],
                "No text to send",
            )];
        }
        if self.nick().is_none() {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNeedMoreParams,
                &me,
                &["PRIVMSG"],
                "Register a nickname first",
            )];
        }

        if target.starts_with('#') {
            return match dispatch_messaging::send_channel_message(
                &self.dispatcher,
                &self.handle,
                SendChannelMessage {
                    channel: target.clone(),
                    body: text,
                    kind: None,
                    reply_to: None,
                    thread_id: None,
                },
            ) {
                Ok(()) => Vec::new(),
                Err(HandlerError::RateLimit) => {
                    debug!(session = %self.handle.session_id, "Wire message rate limited");
                    Vec::new()
                }
                Err(HandlerError::ChannelNotFound(_)) => vec![numeric(
                    WIRE_SERVER,
                    Numeric::ErrNoSuchNick,
                    &me,
                    &[&target],
                    "No such nick/channel",
                )],
                Err(HandlerError::Forbidden(reason)) => vec![numeric(
                    WIRE_SERVER,
                    Numeric::ErrNoSuchNick,
                    &me,
                    &[&target],
                    &reason,
                )],
                Err(e) => vec![numeric(
                    WIRE_SERVER,
                    Numeric::ErrNeedMoreParams,
                    &me,
                    &["PRIVMSG"],
                    &e.to_string(),
                )],
            };
        }

        // Nick-targeted PRIVMSG echoes back to the sender only.
        if self.dispatcher.hub.session_by_alias(&target).is_none() {
            return vec![numeric(
                WIRE_SERVER,
                Numeric::ErrNoSuchNick,
                &me,
                &[&target],
                "No such nick/channel",
            )];
        }
        vec![privmsg(&me, &target, &text)]
    }

    /// Re-encode an outbound hub event for the wire, if it maps to one.
    ///
    /// Only freshly created plaintext messages from other senders translate;
    /// encrypted DM envelopes have no classical representation.
    pub fn translate(&self, event: &ServerEvent) -> Option<String> {
        let ServerEvent::MessageEvent(payload) = event else {
            return None;
        };
        if payload.kind != MessageEventType::Created {
            return None;
        }
        let me = self.nick()?;
        if payload.message.sender_alias == me {
            return None;
        }
        let body = payload.message.body.as_deref()?;

        match payload.scope.channel_name() {
            Some(channel) => Some(privmsg(&payload.message.sender_alias, channel, body)),
            None => match &payload.scope {
                ultra_proto::Scope::Dm { .. } => {
                    Some(privmsg(&payload.message.sender_alias, &me, body))
                }
                _ => None,
            },
        }
    }
}

/// Run one classical-wire session to completion.
pub async fn run_wire_session(
    ws: WebSocketStream<TcpStream>,
    ip: String,
    dispatcher: Arc<Dispatcher>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let session_id = Uuid::new_v4().to_string();
    let (handle, mut outbound_rx) =
        SessionHandle::new(session_id.clone(), SessionKind::Wire, ip.clone());
    dispatcher.hub.register(Arc::clone(&handle));
    let session = WireSession::new(Arc::clone(&dispatcher), Arc::clone(&handle));
    info!(session = %session_id, %ip, "Wire client connected");

    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(raw))) => {
                    let mut replies = String::new();
                    for line in raw.lines() {
                        for reply in session.handle_line(line) {
                            replies.push_str(&reply);
                        }
                    }
                    if !replies.is_empty() && sink.send(Message::Text(replies)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %session_id, error = %e, "Wire read error");
                    break;
                }
            },

            outbound = outbound_rx.recv() => match outbound {
                Some(event) => {
                    if let Some(line) = session.translate(&event)
                        && sink.send(Message::Text(line)).await.is_err()
                    {
                        break;
                    }
                }
                None => break,
            },

            _ = handle.kill.notified() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            _ = shutdown_rx.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    dispatcher.disconnect(&handle);
    info!(session = %session_id, "Wire client disconnected");
}
