//! Alias lifecycle: claim, release on disconnect, nonce-gated reclaim.

mod common;

use common::{TestGateway, join_as};
use ultra_proto::{ErrorCode, ServerEvent};

#[tokio::test]
async fn test_reclaim_requires_nonce_from_new_device() {
    let gateway = TestGateway::start().await;

    // First device claims and then disconnects, leaving the alias idle.
    let mut first = gateway.connect("203.0.113.1");
    first.hello("K1");
    first.claim("Alpha");
    let nonce = first
        .last_alias_result()
        .expect("alias_result")
        .reclaim_nonce
        .expect("nonce issued");
    first.disconnect();

    let record = gateway.dispatcher.store.alias_record("Alpha").expect("row");
    assert!(record.active_session_id.is_none());

    // A new device without the nonce is refused.
    let mut second = gateway.connect("203.0.113.9");
    second.hello("K2");
    second.claim("Alpha");
    let refused = second.last_alias_result().expect("alias_result");
    assert!(!refused.ok);
    assert_eq!(refused.error_key, Some(ErrorCode::Unauthorized));

    // With the nonce the claim succeeds and the nonce rotates.
    second.claim_with_nonce("Alpha", Some(&nonce));
    let accepted = second.last_alias_result().expect("alias_result");
    assert!(accepted.ok);
    let rotated = accepted.reclaim_nonce.expect("nonce rotated");
    assert_ne!(rotated, nonce);
}

#[tokio::test]
async fn test_live_alias_from_other_ip_is_in_use() {
    let gateway = TestGateway::start().await;
    let _alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;

    let mut intruder = gateway.connect("198.51.100.7");
    intruder.hello("K2");
    intruder.claim("Alpha");
    let refused = intruder.last_alias_result().expect("alias_result");
    assert!(!refused.ok);
    assert_eq!(refused.error_key, Some(ErrorCode::AliasInUse));
}

#[tokio::test]
async fn test_claim_requires_handshake() {
    let gateway = TestGateway::start().await;
    let mut client = gateway.connect("203.0.113.1");

    client.claim("Alpha");
    let refused = client.last_alias_result().expect("alias_result");
    assert!(!refused.ok);
    assert_eq!(refused.error_key, Some(ErrorCode::Unauthorized));
}

#[tokio::test]
async fn test_switching_alias_releases_the_old_one() {
    let gateway = TestGateway::start().await;
    let mut client = join_as(&gateway, "Alpha", "203.0.113.1").await;

    client.claim("Bravo");
    let result = client.last_alias_result().expect("alias_result");
    assert!(result.ok);
    assert_eq!(result.alias.as_deref(), Some("Bravo"));

    let old = gateway.dispatcher.store.alias_record("Alpha").expect("row");
    assert!(old.active_session_id.is_none());

    // Another client may take the idle alias with the same device rules.
    let mut second = gateway.connect("203.0.113.2");
    second.hello("K2");
    second.claim("Alpha");
    let refused = second.last_alias_result().expect("alias_result");
    assert!(!refused.ok, "different device still needs the nonce");
}

#[tokio::test]
async fn test_disconnect_broadcasts_offline_presence() {
    let gateway = TestGateway::start().await;
    let mut watcher = join_as(&gateway, "Watcher", "203.0.113.1").await;
    let leaver = join_as(&gateway, "Leaver", "203.0.113.2").await;

    watcher.drain();
    leaver.disconnect();

    let offline = watcher
        .find(|e| {
            matches!(
                e,
                ServerEvent::PresenceEvent(p)
                    if p.alias == "Leaver" && p.status == ultra_proto::PresenceStatus::Offline
            )
        })
        .expect("offline presence observed");
    match offline.as_ref() {
        ServerEvent::PresenceEvent(p) => assert_eq!(p.alias, "Leaver"),
        _ => unreachable!(),
    }
}
