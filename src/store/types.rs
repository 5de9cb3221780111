//! Persisted domain entities and the state document.
//!
//! The document serializes to a single JSON object whose top-level keys are
//! the entity collections; field spellings match the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ultra_proto::{ChannelMode, MessageRecord, Role};

/// A device identity, created on first handshake and never destroyed.
///
/// The public key is opaque to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    pub public_key: String,
    pub created_at: i64,
    pub last_seen_at: i64,
}

/// A claimed alias and its binding to a device.
///
/// `active_session_id` is `None` while no live session holds the alias;
/// `reclaim_nonce` rotates on every successful claim and is required to
/// re-take an idle alias from a different device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRecord {
    pub alias: String,
    pub current_device_id: String,
    pub active_session_id: Option<String>,
    pub last_ip: String,
    pub claimed_at: i64,
    pub reclaim_nonce: String,
}

/// One connection's session row; retained after disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub ip: String,
    pub connected_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<i64>,
    pub resume_token: String,
}

/// A broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: String,
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub modes: std::collections::BTreeSet<ChannelMode>,
    pub owner_alias: String,
    pub created_at: i64,
}

/// Membership row keyed by `(channel, alias)` in the two-level member map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub role: Role,
    pub joined_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_until: Option<i64>,
    #[serde(default)]
    pub is_banned: bool,
}

/// A two-party DM conversation; `alias_a < alias_b` lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmConversation {
    pub convo_id: String,
    pub alias_a: String,
    pub alias_b: String,
    pub created_at: i64,
}

/// Moderation action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationType {
    Kick,
    Ban,
    Unban,
    Mute,
    Unmute,
    RoleSet,
}

impl ModerationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kick => "KICK",
            Self::Ban => "BAN",
            Self::Unban => "UNBAN",
            Self::Mute => "MUTE",
            Self::Unmute => "UNMUTE",
            Self::RoleSet => "ROLE_SET",
        }
    }
}

/// One entry in the moderation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationAction {
    pub action_id: String,
    pub actor_alias: String,
    pub target_alias: String,
    pub channel: String,
    pub action_type: ModerationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: i64,
}

/// A registered bot application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotApp {
    pub bot_id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub enabled_channels: Vec<String>,
    pub created_at: i64,
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: String,
    pub category: String,
    pub actor: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: i64,
}

/// The full persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateDocument {
    pub devices: BTreeMap<String, Device>,
    pub aliases: BTreeMap<String, AliasRecord>,
    pub sessions: BTreeMap<String, SessionRecord>,
    pub channels: BTreeMap<String, Channel>,
    /// Two-level map `{channel: {alias: Membership}}`.
    pub channel_members: BTreeMap<String, BTreeMap<String, Membership>>,
    pub dm_conversations: BTreeMap<String, DmConversation>,
    pub messages: Vec<MessageRecord>,
    pub moderation_actions: Vec<ModerationAction>,
    pub bot_apps: Vec<BotApp>,
    pub audit_events: Vec<AuditEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_top_level_keys() {
        let doc = StateDocument::default();
        let json = serde_json::to_value(&doc).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "devices",
            "aliases",
            "sessions",
            "channels",
            "channelMembers",
            "dmConversations",
            "messages",
            "moderationActions",
            "botApps",
            "auditEvents",
        ] {
            assert!(obj.contains_key(key), "missing top-level key {key}");
        }
    }

    #[test]
    fn test_document_roundtrip_with_defaults() {
        let doc: StateDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.devices.is_empty());
        assert!(doc.messages.is_empty());
    }
}
