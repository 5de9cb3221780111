//! Message records, scopes and reactions.
//!
//! These types are shared verbatim between the wire envelopes and the
//! persisted state document, so every field uses its wire spelling.

use serde::{Deserialize, Serialize};

/// Where a message lives: a channel, a DM conversation, or a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Scope {
    /// A named broadcast channel.
    Channel {
        /// Normalized channel name, `#`-prefixed.
        channel: String,
    },
    /// A two-party DM conversation.
    Dm {
        /// Deterministic conversation id from the sorted alias pair.
        convo_id: String,
    },
    /// A thread hanging off a channel message.
    Thread {
        /// The root message id of the thread.
        thread_id: String,
        /// The channel the thread lives under, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
}

impl Scope {
    /// Scope-key equality for history listing and search.
    ///
    /// Thread scopes compare by thread id alone so a fetch does not need to
    /// name the owning channel.
    pub fn matches(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::Channel { channel: a }, Scope::Channel { channel: b }) => a == b,
            (Scope::Dm { convo_id: a }, Scope::Dm { convo_id: b }) => a == b,
            (Scope::Thread { thread_id: a, .. }, Scope::Thread { thread_id: b, .. }) => a == b,
            _ => false,
        }
    }

    /// The channel name this scope is anchored to, if any.
    pub fn channel_name(&self) -> Option<&str> {
        match self {
            Scope::Channel { channel } => Some(channel),
            Scope::Thread { channel, .. } => channel.as_deref(),
            Scope::Dm { .. } => None,
        }
    }
}

/// Message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// `/me`-style action.
    Action,
    /// Server or bot notice.
    Notice,
}

/// One emoji's reaction state on a message.
///
/// `aliases` never contains duplicates; toggling removes the alias again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// The emoji (opaque string, typically a single grapheme).
    pub emoji: String,
    /// Aliases that currently hold this reaction.
    pub aliases: Vec<String>,
}

/// Opaque end-to-end-encrypted DM envelope.
///
/// The gateway relays these fields without interpretation; nothing here is
/// ever validated beyond JSON shape or inspected as plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub algorithm: String,
    pub nonce: String,
    pub ciphertext: String,
    pub sender_public_key: String,
    pub recipient_encrypted_key: String,
    pub sender_encrypted_key: String,
}

/// A persisted message.
///
/// Exactly one of `body` or `encrypted_payload` is present: DM-scope
/// messages carry the envelope, channel and thread scopes carry the body.
/// `deleted_at` is a tombstone; the row stays for audit and replay
/// suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub message_id: String,
    pub scope: Scope,
    pub sender_alias: String,
    pub sender_device_id: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_payload: Option<EncryptedPayload>,
    /// Insertion time, unix milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    /// Strictly monotonic per-process insertion sequence, never reused.
    pub sequence: u64,
}

impl MessageRecord {
    /// Whether the record has been tombstoned.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
