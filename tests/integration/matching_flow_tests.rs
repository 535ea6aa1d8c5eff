// =============
// tests/integration/matching_flow_tests.rs
// =============
//! Queue writes flowing through the dispatcher into matches.
use std::collections::HashMap;

use crate::test_utils::{eventually, join_request, settle, TestEnv};
use roulette_backend_lib::config::Settings;
use roulette_backend_lib::lifecycle::chat_id_for;
use roulette_backend_lib::store::{ChatCollection, DocumentStore, KeyedStore};
use roulette_common::{QueueStatus, SendMessageRequest};

#[tokio::test]
async fn test_compatible_users_are_matched() {
    let env = TestEnv::running(Settings::default());
    let svc = &env.state.service;

    svc.join_queue(Some("alice"), join_request("Alice", 25, &["movies", "hiking"]))
        .await
        .unwrap();
    svc.join_queue(Some("bob"), join_request("Bob", 30, &["hiking"]))
        .await
        .unwrap();

    let keyed = &env.keyed;
    assert!(
        eventually(|| async move {
            keyed.match_record("alice").await.unwrap().is_some()
                && keyed.match_record("bob").await.unwrap().is_some()
        })
        .await
    );

    let alice = svc.current_match(Some("alice")).await.unwrap().current.unwrap();
    let bob = svc.current_match(Some("bob")).await.unwrap().current.unwrap();
    assert_eq!(alice.partner_uid, "bob");
    assert_eq!(alice.partner_name, "Bob");
    assert_eq!(alice.partner_avatar, "B");
    assert_eq!(bob.partner_uid, "alice");
    assert_eq!(alice.chat_id, chat_id_for("alice", "bob"));
    assert_eq!(alice.chat_id, bob.chat_id);

    for uid in ["alice", "bob"] {
        let entry = keyed.queue_entry(uid).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Connected);
    }

    let session = env
        .docs
        .chat(ChatCollection::Temporary, &alice.chat_id)
        .await
        .unwrap()
        .unwrap();
    assert!(session.is_temporary);
    assert_eq!(session.participants, vec!["alice", "bob"]);
    assert_eq!(session.participant_names["alice"], "Alice");

    env.stop().await;
}

#[tokio::test]
async fn test_age_gap_keeps_users_searching() {
    let env = TestEnv::running(Settings::default());
    let svc = &env.state.service;

    svc.join_queue(Some("young"), join_request("Young", 20, &["music"]))
        .await
        .unwrap();
    svc.join_queue(Some("older"), join_request("Older", 40, &["music"]))
        .await
        .unwrap();
    settle().await;

    for uid in ["young", "older"] {
        assert!(env.keyed.match_record(uid).await.unwrap().is_none());
        let entry = env.keyed.queue_entry(uid).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Searching);
    }

    env.stop().await;
}

#[tokio::test]
async fn test_shared_interest_beats_queue_position() {
    let env = TestEnv::running(Settings::default());
    let svc = &env.state.service;

    // Incompatible among themselves, so both keep waiting
    svc.join_queue(Some("early"), join_request("Early", 25, &["chess"]))
        .await
        .unwrap();
    svc.join_queue(Some("later"), join_request("Later", 40, &["surfing"]))
        .await
        .unwrap();
    settle().await;

    svc.join_queue(Some("newcomer"), join_request("New", 30, &["surfing"]))
        .await
        .unwrap();

    let keyed = &env.keyed;
    assert!(
        eventually(|| async move { keyed.match_record("newcomer").await.unwrap().is_some() })
            .await
    );
    let record = keyed.match_record("newcomer").await.unwrap().unwrap();
    assert_eq!(record.partner_uid, "later");

    env.stop().await;
}

#[tokio::test]
async fn test_concurrent_joins_never_double_book() {
    let env = TestEnv::running(Settings::default());

    let mut joins = Vec::new();
    for i in 0..12 {
        let state = env.state.clone();
        joins.push(tokio::spawn(async move {
            let uid = format!("user{i:02}");
            state
                .service
                .join_queue(Some(&uid), join_request(&uid, 30, &["games"]))
                .await
                .unwrap();
        }));
    }
    for join in joins {
        join.await.unwrap();
    }
    settle().await;

    let mut partners = HashMap::new();
    let mut connected = 0;
    for entry in env.keyed.queue_snapshot().await.unwrap() {
        let record = env.keyed.match_record(&entry.uid).await.unwrap();
        match entry.status {
            QueueStatus::Connected => {
                connected += 1;
                let record = record.expect("connected user without a match");
                partners.insert(entry.uid.clone(), record.partner_uid);
            },
            QueueStatus::Searching => assert!(record.is_none()),
        }
    }

    assert!(connected > 0);
    assert_eq!(connected % 2, 0);
    for (uid, partner) in &partners {
        assert_eq!(partners.get(partner), Some(uid), "{uid} -> {partner} is one-sided");
    }

    env.stop().await;
}

#[tokio::test]
async fn test_end_match_returns_pair_to_search_and_drops_history() {
    let env = TestEnv::running(Settings::default());
    let svc = &env.state.service;

    svc.join_queue(Some("alice"), join_request("Alice", 25, &["movies"]))
        .await
        .unwrap();
    svc.join_queue(Some("bob"), join_request("Bob", 27, &["movies"]))
        .await
        .unwrap();

    let keyed = &env.keyed;
    assert!(eventually(|| async move { keyed.match_record("bob").await.unwrap().is_some() }).await);
    let first = keyed.match_record("bob").await.unwrap().unwrap();
    let chats = &env.state.chats;
    assert!(eventually(|| async move { chats.exists("alice_bob").await.unwrap() }).await);

    svc.send_message(
        Some("alice"),
        &first.chat_id,
        SendMessageRequest {
            text: "hi there".to_string(),
        },
    )
    .await
    .unwrap();

    svc.end_match(Some("alice")).await.unwrap();
    let ended_after = first.created_at;

    // Both are searching again and, being the only compatible pair, rematch
    assert!(
        eventually(|| async move {
            keyed
                .match_record("bob")
                .await
                .unwrap()
                .is_some_and(|m| m.created_at > ended_after)
        })
        .await
    );

    // The fresh session starts empty
    let docs = &env.docs;
    assert!(
        eventually(|| async move {
            docs.chat(ChatCollection::Temporary, "alice_bob")
                .await
                .unwrap()
                .is_some()
        })
        .await
    );
    assert!(docs
        .messages(ChatCollection::Temporary, "alice_bob")
        .await
        .unwrap()
        .is_empty());

    env.stop().await;
}
