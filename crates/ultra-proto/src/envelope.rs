//! Tagged-union event envelopes for the session-multiplexed transport.
//!
//! Every frame is a JSON object `{event, payload}`. A single decode step
//! yields a strongly typed variant; unknown events fail the decode and are
//! answered with `BAD_REQUEST` by the dispatcher.

use crate::chan::ChannelMode;
use crate::error::ErrorCode;
use crate::message::{EncryptedPayload, MessageKind, MessageRecord, Scope};
use crate::roles::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Inbound (client -> gateway)
// ============================================================================

/// Decoded inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    HelloDevice(HelloDevice),
    ClaimAlias(ClaimAlias),
    CommandExec(CommandExec),
    JoinChannel(JoinChannel),
    PartChannel(PartChannel),
    SendChannelMessage(SendChannelMessage),
    SendDmMessage(SendDmMessage),
    ReactToggle(ReactToggle),
    MessageEdit(MessageEdit),
    MessageDelete(MessageDelete),
    HistoryFetch(HistoryFetch),
    TypingState(TypingState),
    BotInvoke(BotInvoke),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub device_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAlias {
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaim_nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandExec {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChannel {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartChannel {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChannelMessage {
    pub channel: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDmMessage {
    pub target_alias: String,
    pub encrypted_payload: EncryptedPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactToggle {
    pub message_id: String,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdit {
    pub message_id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelete {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFetch {
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingState {
    pub scope: Scope,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotInvoke {
    pub bot_id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

// ============================================================================
// Outbound (gateway -> client)
// ============================================================================

/// Encoded outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionReady(SessionReady),
    AliasResult(AliasResult),
    NetworkSnapshot(NetworkSnapshot),
    ChannelEvent(ChannelEventPayload),
    MessageEvent(MessageEventPayload),
    PresenceEvent(PresencePayload),
    ModerationEvent(ModerationPayload),
    BotEvent(BotEventPayload),
    HistorySnapshot(HistorySnapshot),
    ServerError(ServerErrorPayload),
}

/// Presence status of a live alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Away,
    Offline,
}

/// `channel_event.type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelEventType {
    Created,
    Joined,
    Parted,
    TopicChanged,
    ModeChanged,
    Invited,
    Kicked,
    MemberUpdated,
}

/// `message_event.type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageEventType {
    Created,
    Edited,
    Deleted,
    ReactionAdded,
    ReactionRemoved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReady {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub resume_token: String,
    pub motd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaim_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_key: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One channel row in a `network_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub channel_id: String,
    pub name: String,
    pub topic: String,
    pub modes: Vec<ChannelMode>,
    pub owner_alias: String,
    pub created_at: i64,
    pub member_count: u32,
}

/// One DM conversation row in a `network_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmSummary {
    pub convo_id: String,
    pub alias_a: String,
    pub alias_b: String,
    pub created_at: i64,
}

/// One membership row in a `network_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipSummary {
    pub channel: String,
    pub alias: String,
    pub role: Role,
    pub joined_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_until: Option<i64>,
    pub is_banned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub channels: Vec<ChannelSummary>,
    pub dms: Vec<DmSummary>,
    pub memberships: Vec<MembershipSummary>,
    pub unread_counters: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEventPayload {
    #[serde(rename = "type")]
    pub kind: ChannelEventType,
    pub channel: String,
    pub actor: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEventPayload {
    #[serde(rename = "type")]
    pub kind: MessageEventType,
    pub scope: Scope,
    pub message: MessageRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub alias: String,
    pub status: PresenceStatus,
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationPayload {
    pub action: String,
    pub actor: String,
    pub target: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotEventPayload {
    pub bot_id: String,
    pub channel: String,
    pub output: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub scope: Scope,
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

impl ClientEvent {
    /// Decode one inbound frame.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl ServerEvent {
    /// Encode one outbound frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Shorthand for a `server_error` event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::ServerError(ServerErrorPayload {
            code,
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hello_device() {
        let raw = r#"{"event":"hello_device","payload":{"devicePublicKey":"K1"}}"#;
        let event = ClientEvent::decode(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::HelloDevice(HelloDevice {
                device_id: None,
                device_public_key: "K1".into()
            })
        );
    }

    #[test]
    fn test_decode_claim_alias_with_nonce() {
        let raw = r#"{"event":"claim_alias","payload":{"alias":"Alpha","reclaimNonce":"N1"}}"#;
        let event = ClientEvent::decode(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::ClaimAlias(ClaimAlias {
                alias: "Alpha".into(),
                reclaim_nonce: Some("N1".into())
            })
        );
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        assert!(ClientEvent::decode(r#"{"event":"warp_drive","payload":{}}"#).is_err());
        assert!(ClientEvent::decode("not json").is_err());
    }

    #[test]
    fn test_encode_server_error() {
        let json = ServerEvent::error(ErrorCode::RateLimit, "slow down")
            .encode()
            .unwrap();
        assert_eq!(
            json,
            r#"{"event":"server_error","payload":{"code":"RATE_LIMIT","message":"slow down"}}"#
        );
    }

    #[test]
    fn test_channel_event_type_field_spelling() {
        let payload = ChannelEventPayload {
            kind: ChannelEventType::TopicChanged,
            channel: "#lobby".into(),
            actor: "alpha".into(),
            payload: serde_json::json!({"topic": "hi"}),
            timestamp: 5,
        };
        let json = serde_json::to_string(&ServerEvent::ChannelEvent(payload)).unwrap();
        assert!(json.contains(r#""event":"channel_event""#));
        assert!(json.contains(r#""type":"TOPIC_CHANGED""#));
    }

    #[test]
    fn test_dm_send_roundtrip_is_opaque() {
        let raw = r#"{"event":"send_dm_message","payload":{"targetAlias":"Beta","encryptedPayload":{"algorithm":"x25519-xsalsa20","nonce":"n","ciphertext":"CT","senderPublicKey":"spk","recipientEncryptedKey":"rek","senderEncryptedKey":"sek"}}}"#;
        let event = ClientEvent::decode(raw).unwrap();
        match event {
            ClientEvent::SendDmMessage(send) => {
                assert_eq!(send.encrypted_payload.ciphertext, "CT");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
