//! Logical fan-out rooms.
//!
//! One room per live alias (`alias:<a>`) and one per channel
//! (`channel:<name>`). A room's member set is guarded by its own mutex;
//! holding it while inserting into the store and fanning out is what makes
//! per-room delivery order match store insertion order.

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Room key for an alias.
pub fn alias_room(alias: &str) -> String {
    format!("alias:{alias}")
}

/// Room key for a channel.
pub fn channel_room(channel: &str) -> String {
    format!("channel:{channel}")
}

/// One fan-out set.
#[derive(Debug, Default)]
pub struct Room {
    members: Mutex<HashSet<String>>,
}

impl Room {
    /// Exclusive access to the member set; serializes publishes per room.
    pub fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.members.lock()
    }

    pub fn insert(&self, session_id: &str) {
        self.members.lock().insert(session_id.to_string());
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.members.lock().remove(session_id)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.members.lock().iter().cloned().collect()
    }
}

/// Registry of rooms by key; rooms are created on first use and never
/// destroyed (channels are never auto-destroyed either).
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a room, creating it if missing.
    pub fn room(&self, name: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().get(name) {
            return Arc::clone(room);
        }
        let mut rooms = self.rooms.write();
        Arc::clone(rooms.entry(name.to_string()).or_default())
    }

    /// Fetch a room without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().get(name).map(Arc::clone)
    }

    /// Drop a session from every room.
    pub fn remove_everywhere(&self, session_id: &str) {
        let rooms: Vec<Arc<Room>> = self.rooms.read().values().map(Arc::clone).collect();
        for room in rooms {
            room.remove(session_id);
        }
    }
}
