//! Integration test common infrastructure.
//!
//! Drives the dispatcher, hub and store in-process: each test client is a
//! registered session handle whose outbound queue the test drains directly.

#![allow(dead_code)]

use ircultrad::config::Config;
use ircultrad::dispatch::{Dispatcher, Flow};
use ircultrad::hub::{Hub, SessionHandle, SessionKind};
use ircultrad::security::RateLimitManager;
use ircultrad::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use ultra_proto::envelope::{
    AliasResult, ClaimAlias, CommandExec, HelloDevice, HistoryFetch, SendChannelMessage,
    SendDmMessage,
};
use ultra_proto::{ClientEvent, EncryptedPayload, Scope, ServerEvent};
use uuid::Uuid;

/// An in-process gateway instance backed by a temp state file.
pub struct TestGateway {
    pub dispatcher: Arc<Dispatcher>,
    _tmp: TempDir,
}

impl TestGateway {
    pub async fn start() -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let store = Store::open(&tmp.path().join("state.json"), Duration::from_millis(50))
            .await
            .expect("store open");
        let hub = Arc::new(Hub::new());
        let limiter = Arc::new(RateLimitManager::new());
        let config = Arc::new(Config::default());
        let dispatcher = Arc::new(Dispatcher::new(store, hub, limiter, config));
        Self {
            dispatcher,
            _tmp: tmp,
        }
    }

    /// Register a native test session from the given IP.
    pub fn connect(&self, ip: &str) -> TestClient {
        self.connect_kind(ip, SessionKind::Native)
    }

    pub fn connect_kind(&self, ip: &str, kind: SessionKind) -> TestClient {
        let session_id = Uuid::new_v4().to_string();
        let (handle, rx) = SessionHandle::new(session_id, kind, ip.to_string());
        self.dispatcher.hub.register(Arc::clone(&handle));
        TestClient {
            dispatcher: Arc::clone(&self.dispatcher),
            handle,
            rx,
            pending: Default::default(),
        }
    }
}

/// One connected test client.
pub struct TestClient {
    pub dispatcher: Arc<Dispatcher>,
    pub handle: Arc<SessionHandle>,
    pub rx: mpsc::Receiver<Arc<ServerEvent>>,
    /// Events scanned but not yet matched by [`TestClient::find`].
    pending: std::collections::VecDeque<Arc<ServerEvent>>,
}

impl TestClient {
    pub fn send(&self, event: ClientEvent) -> Flow {
        self.dispatcher.handle(&self.handle, event)
    }

    pub fn hello(&self, public_key: &str) {
        self.send(ClientEvent::HelloDevice(HelloDevice {
            device_id: None,
            device_public_key: public_key.to_string(),
        }));
    }

    pub fn hello_as(&self, device_id: &str, public_key: &str) {
        self.send(ClientEvent::HelloDevice(HelloDevice {
            device_id: Some(device_id.to_string()),
            device_public_key: public_key.to_string(),
        }));
    }

    pub fn claim(&self, alias: &str) {
        self.claim_with_nonce(alias, None);
    }

    pub fn claim_with_nonce(&self, alias: &str, nonce: Option<&str>) {
        self.send(ClientEvent::ClaimAlias(ClaimAlias {
            alias: alias.to_string(),
            reclaim_nonce: nonce.map(str::to_string),
        }));
    }

    pub fn join(&self, channel: &str) {
        self.send(ClientEvent::JoinChannel(ultra_proto::envelope::JoinChannel {
            channel: channel.to_string(),
        }));
    }

    pub fn send_text(&self, channel: &str, body: &str) {
        self.send(ClientEvent::SendChannelMessage(SendChannelMessage {
            channel: channel.to_string(),
            body: body.to_string(),
            kind: None,
            reply_to: None,
            thread_id: None,
        }));
    }

    pub fn send_dm(&self, target: &str, ciphertext: &str) {
        self.send(ClientEvent::SendDmMessage(SendDmMessage {
            target_alias: target.to_string(),
            encrypted_payload: envelope_with(ciphertext),
        }));
    }

    pub fn command(&self, raw: &str) -> Flow {
        self.send(ClientEvent::CommandExec(CommandExec {
            raw: raw.to_string(),
            context_channel: None,
        }))
    }

    pub fn fetch_history(&self, scope: Scope, limit: Option<u32>) {
        self.send(ClientEvent::HistoryFetch(HistoryFetch {
            scope,
            before: None,
            limit,
        }));
    }

    /// Pop every queued event, including previously scanned ones.
    pub fn drain(&mut self) -> Vec<Arc<ServerEvent>> {
        let mut events: Vec<Arc<ServerEvent>> = self.pending.drain(..).collect();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Return the first queued event matching `pred`, keeping everything
    /// else queued for later assertions.
    pub fn find<F>(&mut self, pred: F) -> Option<Arc<ServerEvent>>
    where
        F: Fn(&ServerEvent) -> bool,
    {
        if let Some(pos) = self.pending.iter().position(|e| pred(e)) {
            return self.pending.remove(pos);
        }
        while let Ok(event) = self.rx.try_recv() {
            if pred(&event) {
                return Some(event);
            }
            self.pending.push_back(event);
        }
        None
    }

    /// The most recent `alias_result` in the queue.
    pub fn last_alias_result(&mut self) -> Option<AliasResult> {
        self.drain()
            .into_iter()
            .filter_map(|e| match e.as_ref() {
                ServerEvent::AliasResult(r) => Some(r.clone()),
                _ => None,
            })
            .next_back()
    }

    pub fn disconnect(&self) {
        self.dispatcher.disconnect(&self.handle);
    }
}

/// A fixed opaque DM envelope carrying the given ciphertext.
pub fn envelope_with(ciphertext: &str) -> EncryptedPayload {
    EncryptedPayload {
        algorithm: "x25519-xsalsa20-poly1305".to_string(),
        nonce: "n0".to_string(),
        ciphertext: ciphertext.to_string(),
        sender_public_key: "spk".to_string(),
        recipient_encrypted_key: "rek".to_string(),
        sender_encrypted_key: "sek".to_string(),
    }
}

/// Connect, handshake and claim in one step.
pub async fn join_as(gateway: &TestGateway, alias: &str, ip: &str) -> TestClient {
    let mut client = gateway.connect(ip);
    client.hello(&format!("key-{alias}"));
    client.claim(alias);
    client.drain();
    client
}
