//! End-to-end flows over the native transport: broadcast, DMs, history,
//! reactions and message lifecycle.

mod common;

use common::{TestGateway, join_as};
use ultra_proto::envelope::MessageEventType;
use ultra_proto::{ErrorCode, Scope, ServerEvent};

#[tokio::test]
async fn test_two_clients_broadcast() {
    let gateway = TestGateway::start().await;

    let mut alpha = gateway.connect("203.0.113.1");
    alpha.hello("K1");
    let ready = alpha
        .find(|e| matches!(e, ServerEvent::SessionReady(_)))
        .expect("session_ready");
    match ready.as_ref() {
        ServerEvent::SessionReady(r) => assert!(!r.resume_token.is_empty()),
        _ => unreachable!(),
    }

    alpha.claim("Alpha");
    let result = alpha.last_alias_result().expect("alias_result");
    assert!(result.ok);
    assert_eq!(result.alias.as_deref(), Some("Alpha"));
    assert!(result.reclaim_nonce.is_some());

    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;

    // Both were auto-joined to #lobby on first claim.
    alpha.drain();
    alpha.send_text("#lobby", "hi");

    let created = beta
        .find(|e| {
            matches!(
                e,
                ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created
            )
        })
        .expect("beta observes the broadcast");
    match created.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert_eq!(p.message.body.as_deref(), Some("hi"));
            assert_eq!(p.message.sender_alias, "Alpha");
            assert!(p.message.encrypted_payload.is_none());
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_dm_envelope_opacity_and_replay() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;

    alpha.send_dm("Beta", "CT");

    for client in [&mut alpha, &mut beta] {
        let created = client
            .find(|e| {
                matches!(
                    e,
                    ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created
                )
            })
            .expect("both parties observe the DM");
        match created.as_ref() {
            ServerEvent::MessageEvent(p) => {
                let envelope = p.message.encrypted_payload.as_ref().expect("envelope");
                assert_eq!(envelope.ciphertext, "CT");
                assert!(p.message.body.is_none());
                assert!(matches!(p.scope, Scope::Dm { .. }));
            }
            _ => unreachable!(),
        }
    }

    // Replay returns the same record.
    let convo_id = ircultrad::store::Store::dm_convo_id("Alpha", "Beta");
    alpha.fetch_history(Scope::Dm { convo_id }, None);
    let snapshot = alpha
        .find(|e| matches!(e, ServerEvent::HistorySnapshot(_)))
        .expect("history_snapshot");
    match snapshot.as_ref() {
        ServerEvent::HistorySnapshot(s) => {
            assert_eq!(s.messages.len(), 1);
            assert_eq!(
                s.messages[0]
                    .encrypted_payload
                    .as_ref()
                    .expect("envelope")
                    .ciphertext,
                "CT"
            );
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_history_limit_clamps_to_one() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    for i in 0..3 {
        alpha.send_text("#lobby", &format!("msg {i}"));
    }
    alpha.drain();

    alpha.fetch_history(
        Scope::Channel {
            channel: "#lobby".to_string(),
        },
        Some(0),
    );
    let snapshot = alpha
        .find(|e| matches!(e, ServerEvent::HistorySnapshot(_)))
        .expect("history_snapshot");
    match snapshot.as_ref() {
        ServerEvent::HistorySnapshot(s) => {
            assert_eq!(s.messages.len(), 1);
            assert_eq!(s.messages[0].body.as_deref(), Some("msg 2"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_reaction_toggle_roundtrip() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;

    alpha.send_text("#lobby", "react to me");
    let message_id = match alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("own echo")
        .as_ref()
    {
        ServerEvent::MessageEvent(p) => p.message.message_id.clone(),
        _ => unreachable!(),
    };
    beta.drain();

    beta.send(ultra_proto::ClientEvent::ReactToggle(
        ultra_proto::envelope::ReactToggle {
            message_id: message_id.clone(),
            emoji: "🎉".to_string(),
        },
    ));
    let added = beta
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::ReactionAdded))
        .expect("reaction added");
    match added.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert_eq!(p.message.reactions.len(), 1);
            assert_eq!(p.message.reactions[0].aliases, vec!["Beta"]);
        }
        _ => unreachable!(),
    }

    // Toggling again restores the prior reaction state.
    beta.send(ultra_proto::ClientEvent::ReactToggle(
        ultra_proto::envelope::ReactToggle {
            message_id,
            emoji: "🎉".to_string(),
        },
    ));
    let removed = beta
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::ReactionRemoved))
        .expect("reaction removed");
    match removed.as_ref() {
        ServerEvent::MessageEvent(p) => assert!(p.message.reactions.is_empty()),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_edit_and_delete_are_author_only() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;

    alpha.send_text("#lobby", "original");
    let message_id = match alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("own echo")
        .as_ref()
    {
        ServerEvent::MessageEvent(p) => p.message.message_id.clone(),
        _ => unreachable!(),
    };
    beta.drain();

    beta.send(ultra_proto::ClientEvent::MessageEdit(
        ultra_proto::envelope::MessageEdit {
            message_id: message_id.clone(),
            body: "hijacked".to_string(),
        },
    ));
    let refused = beta
        .find(|e| matches!(e, ServerEvent::ServerError(_)))
        .expect("server_error");
    match refused.as_ref() {
        ServerEvent::ServerError(e) => assert_eq!(e.code, ErrorCode::Forbidden),
        _ => unreachable!(),
    }

    alpha.send(ultra_proto::ClientEvent::MessageEdit(
        ultra_proto::envelope::MessageEdit {
            message_id: message_id.clone(),
            body: "edited".to_string(),
        },
    ));
    let edited = alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Edited))
        .expect("edited event");
    match edited.as_ref() {
        ServerEvent::MessageEvent(p) => assert_eq!(p.message.body.as_deref(), Some("edited")),
        _ => unreachable!(),
    }

    alpha.send(ultra_proto::ClientEvent::MessageDelete(
        ultra_proto::envelope::MessageDelete { message_id },
    ));
    let deleted = alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Deleted))
        .expect("deleted event");
    match deleted.as_ref() {
        ServerEvent::MessageEvent(p) => assert!(p.message.deleted_at.is_some()),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_rate_limit_boundary() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;

    for i in 0..25 {
        alpha.send_text("#lobby", &format!("burst {i}"));
    }
    assert!(
        alpha
            .find(|e| matches!(e, ServerEvent::ServerError(_)))
            .is_none(),
        "first 25 sends are admitted"
    );

    alpha.send_text("#lobby", "one too many");
    let refused = alpha
        .find(|e| matches!(e, ServerEvent::ServerError(_)))
        .expect("26th send refused");
    match refused.as_ref() {
        ServerEvent::ServerError(e) => assert_eq!(e.code, ErrorCode::RateLimit),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_ignore_filters_created_messages() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;

    alpha.command("/ignore Beta");
    alpha.drain();

    beta.send_text("#lobby", "you cannot hear me");
    assert!(
        alpha
            .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created))
            .is_none()
    );

    alpha.command("/unignore Beta");
    alpha.drain();
    beta.send_text("#lobby", "now you can");
    assert!(
        alpha
            .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created))
            .is_some()
    );
}
