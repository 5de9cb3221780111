//! Connection hub: session registry, rooms and outbound fan-out.

pub mod rooms;
pub mod session;

pub use rooms::{Room, RoomRegistry, alias_room, channel_room};
pub use session::{OUTBOUND_BUFFER, SessionHandle, SessionKind, SessionMeta};

use crate::colors::ColorAllocator;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use ultra_proto::envelope::{MessageEventPayload, MessageEventType};
use ultra_proto::{ErrorCode, PresenceStatus, ServerEvent};

/// Owns every live session and the room fan-out sets.
#[derive(Debug, Default)]
pub struct Hub {
    sessions: DashMap<String, Arc<SessionHandle>>,
    rooms: RoomRegistry,
    pub colors: ColorAllocator,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Session registry
    // ========================================================================

    pub fn register(&self, handle: Arc<SessionHandle>) {
        self.sessions.insert(handle.session_id.clone(), handle);
    }

    /// Remove a session from the registry and every room.
    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.rooms.remove_everywhere(session_id);
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(session_id).map(|h| Arc::clone(&h))
    }

    /// The live session currently holding an alias, if any.
    pub fn session_by_alias(&self, alias: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .find(|entry| entry.meta.read().alias.as_deref() == Some(alias))
            .map(|entry| Arc::clone(&entry))
    }

    /// All live aliases with their presence status, alias-sorted.
    pub fn live_aliases(&self) -> Vec<(String, PresenceStatus)> {
        let mut aliases: Vec<(String, PresenceStatus)> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let meta = entry.meta.read();
                meta.alias.clone().map(|alias| (alias, meta.status))
            })
            .collect();
        aliases.sort();
        aliases.dedup_by(|a, b| a.0 == b.0);
        aliases
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // ========================================================================
    // Rooms
    // ========================================================================

    pub fn join_room(&self, room: &str, session_id: &str) {
        self.rooms.room(room).insert(session_id);
    }

    pub fn leave_room(&self, room: &str, session_id: &str) {
        if let Some(room) = self.rooms.get(room) {
            room.remove(session_id);
        }
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Send one event to one session. Returns `false` when the session had
    /// to be disconnected for back-pressure.
    pub fn send(&self, handle: &SessionHandle, event: ServerEvent) -> bool {
        self.deliver(handle, &Arc::new(event))
    }

    /// Send a `server_error` to one session.
    pub fn send_error(&self, handle: &SessionHandle, code: ErrorCode, message: impl Into<String>) {
        self.send(handle, ServerEvent::error(code, message));
    }

    /// Broadcast an event to a room. No cross-event ordering guarantee;
    /// message events go through [`Hub::publish_messages`] instead.
    pub fn broadcast_room(&self, room: &str, event: ServerEvent) {
        let members = match self.rooms.get(room) {
            Some(room) => room.snapshot(),
            None => return,
        };
        let event = Arc::new(event);
        let mut overflow = Vec::new();
        for session_id in members {
            if let Some(handle) = self.session(&session_id)
                && !self.deliver(&handle, &event)
            {
                overflow.push(session_id);
            }
        }
        self.reap(overflow);
    }

    /// Broadcast an event to every live session (presence propagation).
    pub fn broadcast_all(&self, event: ServerEvent) {
        let event = Arc::new(event);
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.iter().map(|e| Arc::clone(&e)).collect();
        let mut overflow = Vec::new();
        for handle in handles {
            if !self.deliver(&handle, &event) {
                overflow.push(handle.session_id.clone());
            }
        }
        self.reap(overflow);
    }

    /// Publish a message event with the per-room ordering guarantee.
    ///
    /// Every target room's member set stays locked while `make` runs (the
    /// store insert) and while the event is fanned out, so two subscribers
    /// of one room always observe store insertion order. Room locks are
    /// acquired in sorted key order.
    pub fn publish_messages<F>(&self, room_names: &[String], make: F) -> MessageEventPayload
    where
        F: FnOnce() -> MessageEventPayload,
    {
        let mut names: Vec<&String> = room_names.iter().collect();
        names.sort();
        names.dedup();

        let rooms: Vec<Arc<Room>> = names.iter().map(|n| self.rooms.room(n)).collect();
        let guards: Vec<_> = rooms.iter().map(|r| r.lock()).collect();

        let payload = make();
        let sender_alias = payload.message.sender_alias.clone();
        let is_created = payload.kind == MessageEventType::Created;
        let event = Arc::new(ServerEvent::MessageEvent(payload.clone()));

        let mut seen: HashSet<&String> = HashSet::new();
        let mut overflow = Vec::new();
        for guard in &guards {
            for session_id in guard.iter() {
                if !seen.insert(session_id) {
                    continue;
                }
                let Some(handle) = self.session(session_id) else {
                    continue;
                };
                if is_created && handle.meta.read().ignored.contains(&sender_alias) {
                    continue;
                }
                if !self.deliver(&handle, &event) {
                    overflow.push(session_id.clone());
                }
            }
        }
        drop(seen);
        drop(guards);
        self.reap(overflow);
        payload
    }

    /// Queue one event; on a full buffer the session is a back-pressure
    /// offender and must be disconnected (`INTERNAL`).
    fn deliver(&self, handle: &SessionHandle, event: &Arc<ServerEvent>) -> bool {
        match handle.tx.try_send(Arc::clone(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    session = %handle.session_id,
                    code = ErrorCode::Internal.as_str(),
                    "Outbound buffer overflow - disconnecting slow consumer"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session = %handle.session_id, "Outbound channel closed");
                false
            }
        }
    }

    /// Force-close sessions flagged during a fan-out.
    fn reap(&self, session_ids: Vec<String>) {
        for session_id in session_ids {
            if let Some(handle) = self.remove(&session_id) {
                handle.kill.notify_waiters();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultra_proto::envelope::{MessageEventPayload, MessageEventType};
    use ultra_proto::{MessageKind, MessageRecord, Scope};

    fn record(sender: &str, body: &str, sequence: u64) -> MessageRecord {
        MessageRecord {
            message_id: format!("m{sequence}"),
            scope: Scope::Channel {
                channel: "#lobby".into(),
            },
            sender_alias: sender.to_string(),
            sender_device_id: "d".into(),
            kind: MessageKind::Text,
            body: Some(body.to_string()),
            encrypted_payload: None,
            timestamp: sequence as i64,
            reply_to: None,
            thread_id: None,
            reactions: Vec::new(),
            deleted_at: None,
            sequence,
        }
    }

    fn created(sender: &str, body: &str, sequence: u64) -> MessageEventPayload {
        MessageEventPayload {
            kind: MessageEventType::Created,
            scope: Scope::Channel {
                channel: "#lobby".into(),
            },
            message: record(sender, body, sequence),
        }
    }

    #[tokio::test]
    async fn test_room_fanout_reaches_members_only() {
        let hub = Hub::new();
        let (a, mut a_rx) = SessionHandle::new("a".into(), SessionKind::Native, "1.1.1.1".into());
        let (b, mut b_rx) = SessionHandle::new("b".into(), SessionKind::Native, "1.1.1.2".into());
        hub.register(Arc::clone(&a));
        hub.register(Arc::clone(&b));
        hub.join_room("channel:#lobby", "a");

        hub.publish_messages(&["channel:#lobby".to_string()], || created("x", "hi", 1));

        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ignore_filters_created_only() {
        let hub = Hub::new();
        let (a, mut a_rx) = SessionHandle::new("a".into(), SessionKind::Native, "1.1.1.1".into());
        hub.register(Arc::clone(&a));
        hub.join_room("channel:#lobby", "a");
        a.meta.write().ignored.insert("troll".to_string());

        hub.publish_messages(&["channel:#lobby".to_string()], || created("troll", "spam", 1));
        assert!(a_rx.try_recv().is_err());

        // Non-CREATED kinds from the same sender still arrive.
        hub.publish_messages(&["channel:#lobby".to_string()], || MessageEventPayload {
            kind: MessageEventType::Deleted,
            scope: Scope::Channel {
                channel: "#lobby".into(),
            },
            message: record("troll", "spam", 2),
        });
        assert!(a_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_overflow_disconnects_offender() {
        let hub = Hub::new();
        let (a, _a_rx) = SessionHandle::new("a".into(), SessionKind::Native, "1.1.1.1".into());
        hub.register(Arc::clone(&a));
        hub.join_room("channel:#lobby", "a");

        // Receiver never drained: fill the buffer past capacity.
        for i in 0..(OUTBOUND_BUFFER as u64 + 1) {
            hub.publish_messages(&["channel:#lobby".to_string()], || {
                created("x", "flood", i)
            });
        }
        assert!(hub.session("a").is_none());
    }

    #[tokio::test]
    async fn test_dm_publish_dedupes_across_rooms() {
        let hub = Hub::new();
        let (a, mut a_rx) = SessionHandle::new("a".into(), SessionKind::Native, "1.1.1.1".into());
        hub.register(Arc::clone(&a));
        // Same session in both alias rooms (self-DM edge).
        hub.join_room("alias:Alpha", "a");
        hub.join_room("alias:Beta", "a");

        hub.publish_messages(
            &["alias:Alpha".to_string(), "alias:Beta".to_string()],
            || created("Alpha", "hi", 1),
        );

        assert!(a_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err());
    }
}
