//! Per-session connection state.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use ultra_proto::{PresenceStatus, ServerEvent};

/// Outbound queue depth per session. A session that cannot drain this many
/// events is disconnected by the hub (back-pressure contract).
pub const OUTBOUND_BUFFER: usize = 256;

/// Which endpoint a session arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Session-multiplexed JSON transport.
    Native,
    /// Classical line-oriented transport.
    Wire,
}

/// Mutable per-session state, guarded by the handle's lock.
#[derive(Debug)]
pub struct SessionMeta {
    pub ip: String,
    pub device_id: Option<String>,
    pub device_public_key: Option<String>,
    pub alias: Option<String>,
    /// Whether this session has ever held an alias (gates the `#lobby`
    /// auto-join on first claim).
    pub had_alias: bool,
    pub status: PresenceStatus,
    /// Channels this session is currently joined to, in join order.
    pub channels: Vec<String>,
    /// Session-local outbound filter for `message_event CREATED`.
    pub ignored: HashSet<String>,
    pub color: Option<String>,
}

impl SessionMeta {
    fn new(ip: String) -> Self {
        Self {
            ip,
            device_id: None,
            device_public_key: None,
            alias: None,
            had_alias: false,
            status: PresenceStatus::Online,
            channels: Vec::new(),
            ignored: HashSet::new(),
            color: None,
        }
    }
}

/// A live session registered with the hub.
pub struct SessionHandle {
    pub session_id: String,
    pub kind: SessionKind,
    /// Bounded outbound queue; drained by the connection's write half.
    pub tx: mpsc::Sender<Arc<ServerEvent>>,
    /// Signalled by the hub to force-close the connection.
    pub kill: Notify,
    pub meta: parking_lot::RwLock<SessionMeta>,
}

impl SessionHandle {
    /// Create a handle plus the receiver its connection loop drains.
    pub fn new(
        session_id: String,
        kind: SessionKind,
        ip: String,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<ServerEvent>>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let handle = Arc::new(Self {
            session_id,
            kind,
            tx,
            kill: Notify::new(),
            meta: parking_lot::RwLock::new(SessionMeta::new(ip)),
        });
        (handle, rx)
    }

    /// The session's alias, if one is attached.
    pub fn alias(&self) -> Option<String> {
        self.meta.read().alias.clone()
    }

    /// The session's first joined channel, if any.
    pub fn first_channel(&self) -> Option<String> {
        self.meta.read().channels.first().cloned()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
