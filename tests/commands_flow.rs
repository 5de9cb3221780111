//! Slash-command surface: discovery, presence, DMs, threads, bots.

mod common;

use common::{TestGateway, join_as};
use ultra_proto::envelope::{ChannelEventType, MessageEventType};
use ultra_proto::{ErrorCode, MessageKind, PresenceStatus, Scope, ServerEvent};

#[tokio::test]
async fn test_help_whoami_and_unknown() {
    let gateway = TestGateway::start().await;
    let mut client = join_as(&gateway, "Alpha", "203.0.113.1").await;

    client.command("/help");
    let help = client
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("help notice");
    match help.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert_eq!(p.message.kind, MessageKind::Notice);
            assert!(p.message.body.as_deref().unwrap_or_default().contains("/nick"));
        }
        _ => unreachable!(),
    }

    client.command("/whoami");
    let whoami = client
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("whoami notice");
    match whoami.as_ref() {
        ServerEvent::MessageEvent(p) => {
            let body = p.message.body.as_deref().unwrap_or_default();
            assert!(body.contains("Alpha"));
            assert!(body.contains("203.0.113.1"));
        }
        _ => unreachable!(),
    }

    client.command("/frobnicate now");
    let refused = client
        .find(|e| matches!(e, ServerEvent::ServerError(_)))
        .expect("unknown command refused");
    match refused.as_ref() {
        ServerEvent::ServerError(e) => assert_eq!(e.code, ErrorCode::BadRequest),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_away_back_and_who() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;
    alpha.drain();

    beta.command("/away");
    let away = alpha
        .find(|e| {
            matches!(e, ServerEvent::PresenceEvent(p)
                if p.alias == "Beta" && p.status == PresenceStatus::Away)
        })
        .expect("away presence broadcast");
    match away.as_ref() {
        ServerEvent::PresenceEvent(p) => assert_eq!(p.status, PresenceStatus::Away),
        _ => unreachable!(),
    }

    beta.command("/back");
    assert!(
        alpha
            .find(|e| {
                matches!(e, ServerEvent::PresenceEvent(p)
                    if p.alias == "Beta" && p.status == PresenceStatus::Online)
            })
            .is_some()
    );

    beta.drain();
    beta.command("/who");
    let who = beta
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("who notice");
    match who.as_ref() {
        ServerEvent::MessageEvent(p) => {
            let body = p.message.body.as_deref().unwrap_or_default();
            assert!(body.contains("Alpha"));
            assert!(body.contains("Beta"));
        }
        _ => unreachable!(),
    }

    beta.command("/whois Alpha");
    let whois = beta
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("whois notice");
    match whois.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert!(p.message.body.as_deref().unwrap_or_default().contains("#lobby"));
        }
        _ => unreachable!(),
    }

    beta.command("/whois Nobody");
    let offline = beta
        .find(|e| matches!(e, ServerEvent::ServerError(_)))
        .expect("whois offline refused");
    match offline.as_ref() {
        ServerEvent::ServerError(e) => assert_eq!(e.code, ErrorCode::BadRequest),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_msg_is_delivered_but_never_persisted() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;

    alpha.command("/msg Beta psst  spaced");
    for client in [&mut alpha, &mut beta] {
        let created = client
            .find(|e| {
                matches!(e, ServerEvent::MessageEvent(p)
                    if p.kind == MessageEventType::Created && matches!(p.scope, Scope::Dm { .. }))
            })
            .expect("both parties observe the plaintext DM");
        match created.as_ref() {
            ServerEvent::MessageEvent(p) => {
                assert_eq!(p.message.body.as_deref(), Some("psst  spaced"));
            }
            _ => unreachable!(),
        }
    }

    // Nothing was inserted: persisted DM history stays envelope-only.
    let convo_id = ircultrad::store::Store::dm_convo_id("Alpha", "Beta");
    let history = gateway
        .dispatcher
        .store
        .list_history(&Scope::Dm { convo_id }, 50, None);
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_me_and_reply_and_thread() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;

    alpha.command("/me waves");
    let action = alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created))
        .expect("action message");
    let root_id = match action.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert_eq!(p.message.kind, MessageKind::Action);
            assert_eq!(p.message.body.as_deref(), Some("waves"));
            p.message.message_id.clone()
        }
        _ => unreachable!(),
    };

    alpha.command(&format!("/reply {root_id} nice wave"));
    let reply = alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created))
        .expect("reply message");
    match reply.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert_eq!(p.message.reply_to.as_deref(), Some(root_id.as_str()));
            assert!(matches!(p.scope, Scope::Channel { .. }));
        }
        _ => unreachable!(),
    }

    alpha.command(&format!("/thread {root_id} branching out"));
    let threaded = alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created))
        .expect("thread message");
    match threaded.as_ref() {
        ServerEvent::MessageEvent(p) => match &p.scope {
            Scope::Thread { thread_id, channel } => {
                assert_eq!(thread_id, &root_id);
                assert_eq!(channel.as_deref(), Some("#lobby"));
            }
            other => panic!("unexpected scope: {other:?}"),
        },
        _ => unreachable!(),
    }

    // Thread history is scoped by thread id alone.
    alpha.fetch_history(
        Scope::Thread {
            thread_id: root_id,
            channel: None,
        },
        None,
    );
    let snapshot = alpha
        .find(|e| matches!(e, ServerEvent::HistorySnapshot(_)))
        .expect("thread history");
    match snapshot.as_ref() {
        ServerEvent::HistorySnapshot(s) => {
            assert_eq!(s.messages.len(), 1);
            assert_eq!(s.messages[0].body.as_deref(), Some("branching out"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_search_finds_recent_matches() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;

    alpha.send_text("#lobby", "deploy the fleet");
    alpha.send_text("#lobby", "unrelated chatter");
    alpha.drain();

    alpha.command("/search DEPLOY");
    let hit = alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("search notice");
    match hit.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert!(
                p.message
                    .body
                    .as_deref()
                    .unwrap_or_default()
                    .contains("deploy the fleet")
            );
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_bot_list_and_echo_run() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;

    alpha.command("/bot list");
    let listing = alpha
        .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
        .expect("bot listing");
    match listing.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert!(p.message.body.as_deref().unwrap_or_default().contains("echo"));
        }
        _ => unreachable!(),
    }

    alpha.command("/bot run echo hello there");
    let bot_event = alpha
        .find(|e| matches!(e, ServerEvent::BotEvent(_)))
        .expect("bot_event");
    match bot_event.as_ref() {
        ServerEvent::BotEvent(b) => {
            assert_eq!(b.bot_id, "echo");
            assert_eq!(b.output, "hello there");
            assert_eq!(b.channel, "#lobby");
        }
        _ => unreachable!(),
    }
    let mirror = alpha
        .find(|e| {
            matches!(e, ServerEvent::MessageEvent(p)
                if p.kind == MessageEventType::Created && p.message.kind == MessageKind::Notice)
        })
        .expect("mirrored NOTICE");
    match mirror.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert_eq!(p.message.body.as_deref(), Some("hello there"));
        }
        _ => unreachable!(),
    }

    alpha.command("/bot run missing-bot");
    let refused = alpha
        .find(|e| matches!(e, ServerEvent::ServerError(_)))
        .expect("unknown bot refused");
    match refused.as_ref() {
        ServerEvent::ServerError(e) => assert_eq!(e.code, ErrorCode::BadRequest),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_invite_reaches_target_alias_room() {
    let gateway = TestGateway::start().await;
    let mut owner = join_as(&gateway, "Owner", "203.0.113.1").await;
    let mut guest = join_as(&gateway, "Guest", "203.0.113.2").await;

    owner.command("/join #private");
    owner.drain();
    guest.drain();

    owner.command("/invite Guest #private");
    let invited = guest
        .find(|e| {
            matches!(e, ServerEvent::ChannelEvent(p)
                if matches!(p.kind, ChannelEventType::Invited))
        })
        .expect("guest receives the invite without being a member");
    match invited.as_ref() {
        ServerEvent::ChannelEvent(p) => {
            assert_eq!(p.channel, "#private");
            assert_eq!(p.payload["alias"], "Guest");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_typing_state_fans_to_channel() {
    let gateway = TestGateway::start().await;
    let alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;
    beta.drain();

    alpha.send(ultra_proto::ClientEvent::TypingState(
        ultra_proto::envelope::TypingState {
            scope: Scope::Channel {
                channel: "#lobby".to_string(),
            },
            active: true,
        },
    ));
    let updated = beta
        .find(|e| {
            matches!(e, ServerEvent::ChannelEvent(p)
                if matches!(p.kind, ChannelEventType::MemberUpdated))
        })
        .expect("typing broadcast");
    match updated.as_ref() {
        ServerEvent::ChannelEvent(p) => {
            assert_eq!(p.payload["alias"], "Alpha");
            assert_eq!(p.payload["typing"], true);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_pin_and_clear_are_acknowledged_noops() {
    let gateway = TestGateway::start().await;
    let mut alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;

    for cmd in ["/pin", "/unpin", "/clear"] {
        alpha.command(cmd);
        let ack = alpha
            .find(|e| matches!(e, ServerEvent::MessageEvent(_)))
            .expect("acknowledgement notice");
        match ack.as_ref() {
            ServerEvent::MessageEvent(p) => {
                assert!(
                    p.message
                        .body
                        .as_deref()
                        .unwrap_or_default()
                        .contains("acknowledged")
                );
            }
            _ => unreachable!(),
        }
    }
}

#[tokio::test]
async fn test_plain_command_exec_text_falls_back_to_channel() {
    let gateway = TestGateway::start().await;
    let alpha = join_as(&gateway, "Alpha", "203.0.113.1").await;
    let mut beta = join_as(&gateway, "Beta", "203.0.113.2").await;
    beta.drain();

    alpha.command("just plain words");
    let created = beta
        .find(|e| matches!(e, ServerEvent::MessageEvent(p) if p.kind == MessageEventType::Created))
        .expect("fallback channel text");
    match created.as_ref() {
        ServerEvent::MessageEvent(p) => {
            assert_eq!(p.message.body.as_deref(), Some("just plain words"));
            assert_eq!(p.message.sender_alias, "Alpha");
        }
        _ => unreachable!(),
    }
}
