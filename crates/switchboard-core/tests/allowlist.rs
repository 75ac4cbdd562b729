//! Permission graph behaviour: the grant rule, caching, full-replace updates
//! and tenant scoping.

mod common;

use common::{Harness, ACTOR, OTHER_TENANT, TENANT};
use switchboard_core::models::{AllowlistDirection, AllowlistEntryInput};
use switchboard_core::store::AllowlistStore;
use switchboard_core::ServerError;

use AllowlistDirection::{Both, ReceiveOnly, SendOnly};

#[tokio::test]
async fn test_can_send_follows_forward_and_reverse_edges() {
    let h = Harness::new().await;
    // (owner, counterpart, direction, sender, recipient, expected)
    let cases = [
        ("f1", "f2", Both, "f1", "f2", true),
        ("s1", "s2", SendOnly, "s1", "s2", true),
        ("r1", "r2", ReceiveOnly, "r1", "r2", false),
        ("rb1", "rb2", Both, "rb2", "rb1", true),
        ("rr1", "rr2", ReceiveOnly, "rr2", "rr1", true),
        ("rs1", "rs2", SendOnly, "rs2", "rs1", false),
    ];
    for (owner, counterpart, direction, _, _, _) in cases {
        h.add_agent(owner, TENANT).await;
        h.add_agent(counterpart, TENANT).await;
        h.allow(owner, &[(counterpart, direction)]).await;
    }

    for (owner, counterpart, direction, sender, recipient, expected) in cases {
        let allowed = h
            .state
            .allowlist
            .can_send_message(sender, recipient)
            .await
            .unwrap();
        assert_eq!(
            allowed, expected,
            "edge {} -> {} ({:?}), send {} -> {}",
            owner, counterpart, direction, sender, recipient
        );
    }

    h.add_agent("loner", TENANT).await;
    assert!(!h
        .state
        .allowlist
        .can_send_message("f1", "loner")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_decisions_are_cached_until_invalidated() {
    let h = Harness::new().await;
    h.add_agent("a", TENANT).await;
    h.add_agent("b", TENANT).await;

    let allowlist = &h.state.allowlist;
    assert!(!allowlist.can_send_message("a", "b").await.unwrap());

    // A write that bypasses the service leaves the cached denial in place.
    AllowlistStore::new(h.state.db.clone())
        .replace_for_agent(
            "a",
            vec![AllowlistEntryInput {
                allowed_agent_id: "b".into(),
                direction: Both,
            }],
        )
        .await
        .unwrap();
    assert!(!allowlist.can_send_message("a", "b").await.unwrap());
    assert!(!allowlist.can_send_message("a", "b").await.unwrap());

    // Going through the service invalidates both sides.
    h.allow("a", &[("b", Both)]).await;
    assert!(allowlist.can_send_message("a", "b").await.unwrap());
    assert!(allowlist.can_send_message("b", "a").await.unwrap());
}

#[tokio::test]
async fn test_update_is_full_replace_and_idempotent() {
    let h = Harness::new().await;
    for id in ["a", "b", "c"] {
        h.add_agent(id, TENANT).await;
    }
    let entries = || {
        vec![
            AllowlistEntryInput {
                allowed_agent_id: "b".into(),
                direction: SendOnly,
            },
            AllowlistEntryInput {
                allowed_agent_id: "c".into(),
                direction: Both,
            },
        ]
    };

    let first = h
        .state
        .allowlist
        .update_allowlist("a", entries(), TENANT, ACTOR)
        .await
        .unwrap();
    let second = h
        .state
        .allowlist
        .update_allowlist("a", entries(), TENANT, ACTOR)
        .await
        .unwrap();
    assert_eq!(first.entry_count, 2);
    assert_eq!(second.entry_count, 2);

    let edges = |update: &switchboard_core::models::AllowlistUpdate| {
        let mut e: Vec<_> = update
            .entries
            .iter()
            .map(|e| (e.allowed_agent_id.clone(), e.direction))
            .collect();
        e.sort_by(|x, y| x.0.cmp(&y.0));
        e
    };
    assert_eq!(edges(&first), edges(&second));

    // Replacing with one entry drops the other.
    h.allow("a", &[("c", ReceiveOnly)]).await;
    let stored = h
        .state
        .allowlist
        .get_agent_allowlist("a", TENANT)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].allowed_agent_id, "c");
    assert_eq!(stored[0].direction, ReceiveOnly);

    assert_eq!(
        h.audit
            .actions()
            .iter()
            .filter(|a| *a == "allowlist.updated")
            .count(),
        3
    );
}

#[tokio::test]
async fn test_update_rejects_agents_outside_tenant() {
    let h = Harness::new().await;
    h.add_agent("a", TENANT).await;
    h.add_agent("b", TENANT).await;
    h.add_agent("x", OTHER_TENANT).await;
    h.allow("a", &[("b", Both)]).await;

    let err = h
        .state
        .allowlist
        .update_allowlist(
            "a",
            vec![
                AllowlistEntryInput {
                    allowed_agent_id: "x".into(),
                    direction: Both,
                },
                AllowlistEntryInput {
                    allowed_agent_id: "ghost".into(),
                    direction: Both,
                },
            ],
            TENANT,
            ACTOR,
        )
        .await
        .unwrap_err();
    match err {
        ServerError::NotFound(msg) => {
            assert!(msg.contains("x"), "{}", msg);
            assert!(msg.contains("ghost"), "{}", msg);
        }
        other => panic!("expected NotFound, got {:?}", other),
    }

    // The previous allowlist survives the rejected update.
    let stored = h
        .state
        .allowlist
        .get_agent_allowlist("a", TENANT)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].allowed_agent_id, "b");
}

#[tokio::test]
async fn test_cross_tenant_agent_is_not_found() {
    let h = Harness::new().await;
    h.add_agent("x", OTHER_TENANT).await;

    let err = h
        .state
        .allowlist
        .get_agent_allowlist("x", TENANT)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NotFound(_)));

    let err = h
        .state
        .allowlist
        .update_allowlist("x", vec![], TENANT, ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NotFound(_)));
}

#[tokio::test]
async fn test_self_entry_is_rejected() {
    let h = Harness::new().await;
    h.add_agent("a", TENANT).await;
    let err = h
        .state
        .allowlist
        .update_allowlist(
            "a",
            vec![AllowlistEntryInput {
                allowed_agent_id: "a".into(),
                direction: Both,
            }],
            TENANT,
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::BadRequest(_)));
}

#[tokio::test]
async fn test_communication_graph_is_tenant_scoped() {
    let h = Harness::new().await;
    for id in ["a", "b", "c"] {
        h.add_agent(id, TENANT).await;
    }
    h.add_agent("x", OTHER_TENANT).await;
    h.allow("a", &[("b", SendOnly), ("c", Both)]).await;
    h.allow("b", &[("c", ReceiveOnly)]).await;

    let graph = h
        .state
        .allowlist
        .get_communication_graph(TENANT)
        .await
        .unwrap();
    let mut nodes: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    nodes.sort();
    assert_eq!(nodes, vec!["a", "b", "c"]);

    assert_eq!(graph.edges.len(), 3);
    assert!(graph
        .edges
        .iter()
        .any(|e| e.source == "b" && e.target == "c" && e.direction == ReceiveOnly));

    let other = h
        .state
        .allowlist
        .get_communication_graph(OTHER_TENANT)
        .await
        .unwrap();
    assert_eq!(other.nodes.len(), 1);
    assert!(other.edges.is_empty());
}
