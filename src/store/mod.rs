//! Durable domain state.
//!
//! The store owns the authoritative in-memory [`StateDocument`] behind a
//! single `RwLock`; every operation is atomic and linearizable in wall-clock
//! order. Mutations mark the store dirty and nudge the write-behind flusher,
//! which debounces and coalesces concurrent mutations into one full-document
//! rewrite.

pub mod persistence;
pub mod types;

use crate::error::StoreError;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{
    AliasRecord, AuditEvent, BotApp, Channel, Device, DmConversation, Membership,
    ModerationAction, ModerationType, SessionRecord, StateDocument,
};
use ultra_proto::envelope::{ChannelSummary, DmSummary, MembershipSummary, NetworkSnapshot};
use ultra_proto::{ChannelMode, EncryptedPayload, MessageKind, MessageRecord, Role, Scope};
use uuid::Uuid;

/// History listing hard bounds.
pub const HISTORY_LIMIT_MIN: usize = 1;
pub const HISTORY_LIMIT_MAX: usize = 200;

/// Current unix time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Alias claim refusal: the alias belongs to a different device and the
/// caller presented no matching reclaim nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimDenied;

/// Everything needed to insert a message; ids, sequence and (normally)
/// timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub scope: Scope,
    pub sender_alias: String,
    pub sender_device_id: String,
    pub kind: MessageKind,
    pub body: Option<String>,
    pub encrypted_payload: Option<EncryptedPayload>,
    pub reply_to: Option<String>,
    pub thread_id: Option<String>,
    /// Override the insertion timestamp; used by replay tooling and tests.
    pub timestamp: Option<i64>,
}

/// Single-writer, write-behind document store.
pub struct Store {
    path: PathBuf,
    flush_interval: Duration,
    state: RwLock<StateDocument>,
    dirty: AtomicBool,
    flush_notify: Notify,
    sequence: AtomicU64,
}

impl Store {
    /// Open the store, loading the document or initializing an empty one.
    ///
    /// A missing or corrupt file starts empty and is written immediately so
    /// the path is known-good from the first mutation on.
    pub async fn open(path: &Path, flush_interval: Duration) -> Result<Arc<Self>, StoreError> {
        let loaded = persistence::load_document(path).await?;
        let fresh = loaded.is_none();
        let mut doc = loaded.unwrap_or_default();

        let seeded = doc.bot_apps.is_empty();
        if seeded {
            doc.bot_apps.push(BotApp {
                bot_id: "echo".to_string(),
                name: "echo".to_string(),
                version: "1.0.0".to_string(),
                permissions: vec!["channel.message".to_string()],
                enabled_channels: Vec::new(),
                created_at: now_ms(),
            });
        }

        let max_seq = doc.messages.iter().map(|m| m.sequence).max().unwrap_or(0);

        let store = Arc::new(Self {
            path: path.to_path_buf(),
            flush_interval,
            state: RwLock::new(doc),
            dirty: AtomicBool::new(fresh || seeded),
            flush_notify: Notify::new(),
            sequence: AtomicU64::new(max_seq),
        });

        store.flush().await?;
        if fresh {
            info!(path = %path.display(), "Initialized empty state document");
        } else {
            info!(path = %path.display(), "State document loaded");
        }

        Ok(store)
    }

    /// Spawn the write-behind flusher task.
    ///
    /// Each dirty mark schedules a flush `flush_interval` later; mutations
    /// landing inside that window coalesce into the same flush. Shutdown
    /// performs a final flush.
    pub fn spawn_flusher(
        self: &Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = store.flush_notify.notified() => {
                        tokio::time::sleep(store.flush_interval).await;
                        if let Err(e) = store.flush().await {
                            warn!(error = %e, "State flush failed - will retry on next mutation");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        if let Err(e) = store.flush().await {
                            warn!(error = %e, "Final state flush failed");
                        }
                        break;
                    }
                }
            }
        })
    }

    /// Flush the document if dirty. Failures re-mark the store dirty so the
    /// next mutation (or shutdown) retries.
    pub async fn flush(&self) -> Result<(), StoreError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let json = {
            let state = self.state.read();
            serde_json::to_string_pretty(&*state)?
        };

        if let Err(e) = persistence::write_document(&self.path, &json).await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!(path = %self.path.display(), "State document flushed");
        Ok(())
    }

    /// Mark dirty and schedule a flush.
    fn touch(&self) {
        if !self.dirty.swap(true, Ordering::AcqRel) {
            self.flush_notify.notify_one();
        }
    }

    /// Next value of the per-process monotonic sequence.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ========================================================================
    // Devices and sessions
    // ========================================================================

    /// Create or refresh a device row.
    pub fn upsert_device(&self, device_id: Option<&str>, public_key: &str) -> Device {
        let now = now_ms();
        let mut state = self.state.write();
        let device = match device_id.and_then(|id| state.devices.get_mut(id)) {
            Some(existing) => {
                existing.public_key = public_key.to_string();
                existing.last_seen_at = now;
                existing.clone()
            }
            None => {
                let id = device_id
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let device = Device {
                    device_id: id.clone(),
                    public_key: public_key.to_string(),
                    created_at: now,
                    last_seen_at: now,
                };
                state.devices.insert(id, device.clone());
                device
            }
        };
        drop(state);
        self.touch();
        device
    }

    /// Create a session row for a new connection.
    pub fn create_session(&self, session_id: &str, device_id: &str, ip: &str) -> SessionRecord {
        let session = SessionRecord {
            session_id: session_id.to_string(),
            device_id: device_id.to_string(),
            alias: None,
            ip: ip.to_string(),
            connected_at: now_ms(),
            disconnected_at: None,
            resume_token: Uuid::new_v4().to_string(),
        };
        self.state
            .write()
            .sessions
            .insert(session.session_id.clone(), session.clone());
        self.touch();
        session
    }

    /// Close a session row; the row persists with `disconnected_at` set.
    pub fn close_session(&self, session_id: &str) {
        let mut state = self.state.write();
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.disconnected_at = Some(now_ms());
        }
        drop(state);
        self.touch();
    }

    /// The alias most recently claimed by this device, if any.
    pub fn alias_for_device(&self, device_id: &str) -> Option<String> {
        let state = self.state.read();
        state
            .aliases
            .values()
            .filter(|a| a.current_device_id == device_id)
            .max_by_key(|a| a.claimed_at)
            .map(|a| a.alias.clone())
    }

    // ========================================================================
    // Aliases
    // ========================================================================

    /// Look up an alias record.
    pub fn alias_record(&self, alias: &str) -> Option<AliasRecord> {
        self.state.read().aliases.get(alias).cloned()
    }

    /// Atomically claim an alias for a session.
    ///
    /// When the persisted record belongs to a different device the caller
    /// must present the current reclaim nonce. On success the nonce rotates
    /// and the session row is updated to carry the alias.
    pub fn claim_alias(
        &self,
        alias: &str,
        device_id: &str,
        session_id: &str,
        ip: &str,
        reclaim_nonce: Option<&str>,
    ) -> Result<AliasRecord, ClaimDenied> {
        let now = now_ms();
        let mut state = self.state.write();

        if let Some(existing) = state.aliases.get(alias)
            && existing.current_device_id != device_id
            && reclaim_nonce != Some(existing.reclaim_nonce.as_str())
        {
            return Err(ClaimDenied);
        }

        let record = AliasRecord {
            alias: alias.to_string(),
            current_device_id: device_id.to_string(),
            active_session_id: Some(session_id.to_string()),
            last_ip: ip.to_string(),
            claimed_at: now,
            reclaim_nonce: Uuid::new_v4().to_string(),
        };
        state.aliases.insert(alias.to_string(), record.clone());
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.alias = Some(alias.to_string());
        }
        drop(state);
        self.touch();
        Ok(record)
    }

    /// Release a live alias; the row stays for later reclaim.
    pub fn release_alias(&self, alias: &str) {
        let mut state = self.state.write();
        if let Some(record) = state.aliases.get_mut(alias) {
            record.active_session_id = None;
        }
        drop(state);
        self.touch();
    }

    // ========================================================================
    // Channels and memberships
    // ========================================================================

    /// Create the channel if missing. Returns the row and whether it was
    /// created by this call.
    pub fn ensure_channel(&self, name: &str, owner_alias: &str) -> (Channel, bool) {
        let mut state = self.state.write();
        if let Some(existing) = state.channels.get(name) {
            return (existing.clone(), false);
        }
        let channel = Channel {
            channel_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            topic: String::new(),
            modes: Default::default(),
            owner_alias: owner_alias.to_string(),
            created_at: now_ms(),
        };
        state.channels.insert(name.to_string(), channel.clone());
        drop(state);
        self.touch();
        (channel, true)
    }

    /// Look up a channel by normalized name.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.state.read().channels.get(name).cloned()
    }

    /// All channels with their member counts.
    pub fn channels_with_counts(&self) -> Vec<(Channel, usize)> {
        let state = self.state.read();
        state
            .channels
            .values()
            .map(|c| {
                let count = state
                    .channel_members
                    .get(&c.name)
                    .map(|m| m.values().filter(|row| !row.is_banned).count())
                    .unwrap_or(0);
                (c.clone(), count)
            })
            .collect()
    }

    /// Insert a membership row if absent; an existing row is returned
    /// unchanged so rejoining while present keeps role and flags.
    pub fn upsert_membership(&self, channel: &str, alias: &str, role_if_new: Role) -> Membership {
        let mut state = self.state.write();
        let members = state.channel_members.entry(channel.to_string()).or_default();
        let membership = members
            .entry(alias.to_string())
            .or_insert_with(|| Membership {
                role: role_if_new,
                joined_at: now_ms(),
                muted_until: None,
                is_banned: false,
            })
            .clone();
        drop(state);
        self.touch();
        membership
    }

    /// Remove a membership row. Returns whether a row existed.
    pub fn part_membership(&self, channel: &str, alias: &str) -> bool {
        let mut state = self.state.write();
        let removed = state
            .channel_members
            .get_mut(channel)
            .is_some_and(|members| members.remove(alias).is_some());
        drop(state);
        if removed {
            self.touch();
        }
        removed
    }

    /// Look up one membership row.
    pub fn membership(&self, channel: &str, alias: &str) -> Option<Membership> {
        self.state
            .read()
            .channel_members
            .get(channel)
            .and_then(|members| members.get(alias))
            .cloned()
    }

    /// All membership rows for a channel, alias-sorted.
    pub fn channel_members(&self, channel: &str) -> Vec<(String, Membership)> {
        self.state
            .read()
            .channel_members
            .get(channel)
            .map(|members| {
                members
                    .iter()
                    .map(|(alias, row)| (alias.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Channels an alias is currently a member of.
    pub fn member_channels(&self, alias: &str) -> Vec<String> {
        self.state
            .read()
            .channel_members
            .iter()
            .filter(|(_, members)| members.contains_key(alias))
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    /// Set a member's role. Returns the updated row.
    pub fn set_member_role(&self, channel: &str, alias: &str, role: Role) -> Option<Membership> {
        let mut state = self.state.write();
        let row = state
            .channel_members
            .get_mut(channel)?
            .get_mut(alias)
            .map(|m| {
                m.role = role;
                m.clone()
            });
        drop(state);
        if row.is_some() {
            self.touch();
        }
        row
    }

    /// Set or clear a member's mute deadline.
    pub fn set_member_mute(
        &self,
        channel: &str,
        alias: &str,
        until: Option<i64>,
    ) -> Option<Membership> {
        let mut state = self.state.write();
        let row = state
            .channel_members
            .get_mut(channel)?
            .get_mut(alias)
            .map(|m| {
                m.muted_until = until;
                m.clone()
            });
        drop(state);
        if row.is_some() {
            self.touch();
        }
        row
    }

    /// Set or clear a member's ban flag; the row is retained either way.
    pub fn set_member_ban(&self, channel: &str, alias: &str, banned: bool) -> Option<Membership> {
        let mut state = self.state.write();
        let row = state
            .channel_members
            .get_mut(channel)?
            .get_mut(alias)
            .map(|m| {
                m.is_banned = banned;
                m.clone()
            });
        drop(state);
        if row.is_some() {
            self.touch();
        }
        row
    }

    /// Replace a channel's topic.
    pub fn set_channel_topic(&self, channel: &str, topic: &str) -> Option<Channel> {
        let mut state = self.state.write();
        let row = state.channels.get_mut(channel).map(|c| {
            c.topic = topic.to_string();
            c.clone()
        });
        drop(state);
        if row.is_some() {
            self.touch();
        }
        row
    }

    /// Add or remove one mode flag; returns the full updated set.
    pub fn set_channel_mode(
        &self,
        channel: &str,
        mode: ChannelMode,
        enable: bool,
    ) -> Option<Vec<ChannelMode>> {
        let mut state = self.state.write();
        let modes = state.channels.get_mut(channel).map(|c| {
            if enable {
                c.modes.insert(mode);
            } else {
                c.modes.remove(&mode);
            }
            c.modes.iter().copied().collect()
        });
        drop(state);
        if modes.is_some() {
            self.touch();
        }
        modes
    }

    // ========================================================================
    // DM conversations
    // ========================================================================

    /// Deterministic conversation id for a sorted alias pair.
    pub fn dm_convo_id(a: &str, b: &str) -> String {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        format!("dm:{first}|{second}")
    }

    /// Find or create the conversation for an alias pair.
    pub fn get_or_create_dm_conversation(&self, a: &str, b: &str) -> DmConversation {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let convo_id = Self::dm_convo_id(first, second);

        let mut state = self.state.write();
        if let Some(existing) = state.dm_conversations.get(&convo_id) {
            return existing.clone();
        }
        let convo = DmConversation {
            convo_id: convo_id.clone(),
            alias_a: first.to_string(),
            alias_b: second.to_string(),
            created_at: now_ms(),
        };
        state.dm_conversations.insert(convo_id, convo.clone());
        drop(state);
        self.touch();
        convo
    }

    /// Look up a conversation by id.
    pub fn dm_conversation(&self, convo_id: &str) -> Option<DmConversation> {
        self.state.read().dm_conversations.get(convo_id).cloned()
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Insert a message, assigning id, sequence and timestamp.
    pub fn insert_message(&self, draft: MessageDraft) -> MessageRecord {
        let record = MessageRecord {
            message_id: Uuid::new_v4().to_string(),
            scope: draft.scope,
            sender_alias: draft.sender_alias,
            sender_device_id: draft.sender_device_id,
            kind: draft.kind,
            body: draft.body,
            encrypted_payload: draft.encrypted_payload,
            timestamp: draft.timestamp.unwrap_or_else(now_ms),
            reply_to: draft.reply_to,
            thread_id: draft.thread_id,
            reactions: Vec::new(),
            deleted_at: None,
            sequence: self.next_sequence(),
        };
        self.state.write().messages.push(record.clone());
        self.touch();
        record
    }

    /// Find a message by id; tombstoned records are returned too.
    pub fn find_message(&self, message_id: &str) -> Option<MessageRecord> {
        self.state
            .read()
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .cloned()
    }

    /// Replace a message body. Tombstoned records are not editable.
    /// Id, scope, sender, timestamp and reactions are preserved.
    pub fn edit_message(&self, message_id: &str, body: &str) -> Option<MessageRecord> {
        let mut state = self.state.write();
        let record = state
            .messages
            .iter_mut()
            .find(|m| m.message_id == message_id && !m.is_deleted())
            .map(|m| {
                m.body = Some(body.to_string());
                m.clone()
            });
        drop(state);
        if record.is_some() {
            self.touch();
        }
        record
    }

    /// Tombstone a message. Idempotent; the record stays for audit.
    pub fn delete_message(&self, message_id: &str) -> Option<MessageRecord> {
        let mut state = self.state.write();
        let record = state
            .messages
            .iter_mut()
            .find(|m| m.message_id == message_id)
            .map(|m| {
                if m.deleted_at.is_none() {
                    m.deleted_at = Some(now_ms());
                }
                m.clone()
            });
        drop(state);
        if record.is_some() {
            self.touch();
        }
        record
    }

    /// Toggle a `(emoji, alias)` reaction. Returns the updated record and
    /// whether the reaction was added (`true`) or removed (`false`).
    pub fn toggle_reaction(
        &self,
        message_id: &str,
        alias: &str,
        emoji: &str,
    ) -> Option<(MessageRecord, bool)> {
        let mut state = self.state.write();
        let result = state
            .messages
            .iter_mut()
            .find(|m| m.message_id == message_id && !m.is_deleted())
            .map(|m| {
                let added = match m.reactions.iter_mut().find(|r| r.emoji == emoji) {
                    Some(reaction) => {
                        if let Some(pos) = reaction.aliases.iter().position(|a| a == alias) {
                            reaction.aliases.remove(pos);
                            false
                        } else {
                            reaction.aliases.push(alias.to_string());
                            true
                        }
                    }
                    None => {
                        m.reactions.push(ultra_proto::Reaction {
                            emoji: emoji.to_string(),
                            aliases: vec![alias.to_string()],
                        });
                        true
                    }
                };
                m.reactions.retain(|r| !r.aliases.is_empty());
                (m.clone(), added)
            });
        drop(state);
        if result.is_some() {
            self.touch();
        }
        result
    }

    /// List live history for a scope, ascending by timestamp, tail-sliced
    /// to `limit` (clamped into `[1, 200]`).
    pub fn list_history(&self, scope: &Scope, limit: usize, before: Option<i64>) -> Vec<MessageRecord> {
        let limit = limit.clamp(HISTORY_LIMIT_MIN, HISTORY_LIMIT_MAX);
        let state = self.state.read();
        let mut matching: Vec<MessageRecord> = state
            .messages
            .iter()
            .filter(|m| m.scope.matches(scope) && !m.is_deleted())
            .filter(|m| before.is_none_or(|b| m.timestamp < b))
            .cloned()
            .collect();
        matching.sort_by_key(|m| (m.timestamp, m.sequence));
        let start = matching.len().saturating_sub(limit);
        matching.split_off(start)
    }

    /// Case-insensitive substring search over live channel message bodies.
    /// Encrypted DM payloads are never searched.
    pub fn search_channel_messages(
        &self,
        channel: &str,
        term: &str,
        limit: usize,
    ) -> Vec<MessageRecord> {
        let needle = term.to_lowercase();
        let scope = Scope::Channel {
            channel: channel.to_string(),
        };
        let state = self.state.read();
        let mut matching: Vec<MessageRecord> = state
            .messages
            .iter()
            .filter(|m| m.scope.matches(&scope) && !m.is_deleted())
            .filter(|m| {
                m.body
                    .as_ref()
                    .is_some_and(|body| body.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matching.sort_by_key(|m| (m.timestamp, m.sequence));
        let start = matching.len().saturating_sub(limit);
        matching.split_off(start)
    }

    /// Tombstone messages older than `days`. Returns how many were marked.
    pub fn run_retention_cleanup(&self, days: i64) -> usize {
        let now = now_ms();
        let cutoff = now - days * 86_400_000;
        let mut state = self.state.write();
        let mut marked = 0;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.timestamp < cutoff && !m.is_deleted())
        {
            message.deleted_at = Some(now);
            marked += 1;
        }
        drop(state);
        if marked > 0 {
            self.touch();
        }
        marked
    }

    // ========================================================================
    // Moderation, bots, audit
    // ========================================================================

    /// Append to the moderation log.
    pub fn insert_moderation_action(
        &self,
        actor: &str,
        target: &str,
        channel: &str,
        action_type: ModerationType,
        reason: Option<&str>,
    ) -> ModerationAction {
        let action = ModerationAction {
            action_id: Uuid::new_v4().to_string(),
            actor_alias: actor.to_string(),
            target_alias: target.to_string(),
            channel: channel.to_string(),
            action_type,
            reason: reason.map(str::to_string),
            created_at: now_ms(),
        };
        self.state.write().moderation_actions.push(action.clone());
        self.touch();
        action
    }

    /// All registered bots.
    pub fn list_bots(&self) -> Vec<BotApp> {
        self.state.read().bot_apps.clone()
    }

    /// Find a bot by id.
    pub fn find_bot(&self, bot_id: &str) -> Option<BotApp> {
        self.state
            .read()
            .bot_apps
            .iter()
            .find(|b| b.bot_id == bot_id)
            .cloned()
    }

    /// Append to the audit log.
    pub fn insert_audit_event(&self, category: &str, actor: &str, payload: serde_json::Value) {
        let event = AuditEvent {
            event_id: Uuid::new_v4().to_string(),
            category: category.to_string(),
            actor: actor.to_string(),
            payload,
            created_at: now_ms(),
        };
        self.state.write().audit_events.push(event);
        self.touch();
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Build the `network_snapshot` payload for one alias.
    ///
    /// Membership rosters cover the channels the alias belongs to, with
    /// banned rows filtered from the listing.
    pub fn network_snapshot(&self, alias: &str) -> NetworkSnapshot {
        let state = self.state.read();

        let channels: Vec<ChannelSummary> = state
            .channels
            .values()
            .map(|c| ChannelSummary {
                channel_id: c.channel_id.clone(),
                name: c.name.clone(),
                topic: c.topic.clone(),
                modes: c.modes.iter().copied().collect(),
                owner_alias: c.owner_alias.clone(),
                created_at: c.created_at,
                member_count: state
                    .channel_members
                    .get(&c.name)
                    .map(|m| m.values().filter(|row| !row.is_banned).count() as u32)
                    .unwrap_or(0),
            })
            .collect();

        let dms: Vec<DmSummary> = state
            .dm_conversations
            .values()
            .filter(|c| c.alias_a == alias || c.alias_b == alias)
            .map(|c| DmSummary {
                convo_id: c.convo_id.clone(),
                alias_a: c.alias_a.clone(),
                alias_b: c.alias_b.clone(),
                created_at: c.created_at,
            })
            .collect();

        let own_channels: Vec<&String> = state
            .channel_members
            .iter()
            .filter(|(_, members)| members.contains_key(alias))
            .map(|(channel, _)| channel)
            .collect();

        let mut memberships = Vec::new();
        for channel in own_channels {
            if let Some(members) = state.channel_members.get(channel) {
                for (member_alias, row) in members {
                    if row.is_banned {
                        continue;
                    }
                    memberships.push(MembershipSummary {
                        channel: channel.clone(),
                        alias: member_alias.clone(),
                        role: row.role,
                        joined_at: row.joined_at,
                        muted_until: row.muted_until,
                        is_banned: row.is_banned,
                    });
                }
            }
        }

        NetworkSnapshot {
            channels,
            dms,
            memberships,
            unread_counters: Default::default(),
        }
    }
}
