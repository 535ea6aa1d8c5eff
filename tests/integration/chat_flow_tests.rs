// =============
// tests/integration/chat_flow_tests.rs
// =============
//! Saving, deleting and repairing chat sessions of live matches.
use crate::test_utils::{eventually, join_request, TestEnv};
use roulette_backend_lib::config::{EndMatchPolicy, SessionMode, Settings};
use roulette_backend_lib::error::AppError;
use roulette_backend_lib::store::{ChatCollection, DocumentStore, KeyedStore, WriteBatch, WriteOp};
use roulette_common::{ChatRequest, SendMessageRequest};

fn chat(id: &str) -> ChatRequest {
    ChatRequest {
        chat_id: Some(id.to_string()),
    }
}

fn say(text: &str) -> SendMessageRequest {
    SendMessageRequest {
        text: text.to_string(),
    }
}

/// Start a running env and pair `anna` with `ben`
async fn matched(settings: Settings) -> (TestEnv, String) {
    let env = TestEnv::running(settings);
    let svc = &env.state.service;
    svc.join_queue(Some("anna"), join_request("Anna", 22, &["art"]))
        .await
        .unwrap();
    svc.join_queue(Some("ben"), join_request("Ben", 24, &["art"]))
        .await
        .unwrap();

    let keyed = &env.keyed;
    assert!(eventually(|| async move { keyed.match_record("ben").await.unwrap().is_some() }).await);
    let chat_id = keyed.match_record("anna").await.unwrap().unwrap().chat_id;

    // The session is written right after the match commit
    let chats = &env.state.chats;
    let id = chat_id.as_str();
    assert!(eventually(|| async move { chats.exists(id).await.unwrap() }).await);
    (env, chat_id)
}

#[tokio::test]
async fn test_save_chat_migrates_history() {
    let (env, chat_id) = matched(Settings::default()).await;
    let svc = &env.state.service;

    for (uid, text) in [("anna", "hey"), ("ben", "hello"), ("anna", "want to keep this?")] {
        svc.send_message(Some(uid), &chat_id, say(text)).await.unwrap();
    }

    svc.save_chat(Some("ben"), chat(&chat_id)).await.unwrap();

    let saved = env
        .docs
        .chat(ChatCollection::Permanent, &chat_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!saved.is_temporary);
    assert!(saved.saved_at.is_some());
    assert_eq!(saved.participants, vec!["anna", "ben"]);
    assert_eq!(saved.last_message.as_deref(), Some("want to keep this?"));

    let history = env.docs.messages(ChatCollection::Permanent, &chat_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].body["senderId"], "ben");

    assert!(env
        .docs
        .chat(ChatCollection::Temporary, &chat_id)
        .await
        .unwrap()
        .is_none());
    assert!(env
        .docs
        .messages(ChatCollection::Temporary, &chat_id)
        .await
        .unwrap()
        .is_empty());

    // A second save finds nothing temporary
    let err = svc.save_chat(Some("anna"), chat(&chat_id)).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Messages keep flowing into the saved session
    svc.send_message(Some("anna"), &chat_id, say("saved!")).await.unwrap();
    assert_eq!(
        env.docs
            .messages(ChatCollection::Permanent, &chat_id)
            .await
            .unwrap()
            .len(),
        4
    );

    env.stop().await;
}

#[tokio::test]
async fn test_saved_chat_survives_end_match() {
    let (env, chat_id) = matched(Settings::default()).await;
    let svc = &env.state.service;

    svc.send_message(Some("anna"), &chat_id, say("bye")).await.unwrap();
    svc.save_chat(Some("anna"), chat(&chat_id)).await.unwrap();
    svc.end_match(Some("ben")).await.unwrap();

    assert!(env
        .docs
        .chat(ChatCollection::Permanent, &chat_id)
        .await
        .unwrap()
        .is_some());

    env.stop().await;
}

#[tokio::test]
async fn test_delete_chat_access_rules() {
    let (env, chat_id) = matched(Settings::default()).await;
    let svc = &env.state.service;
    svc.send_message(Some("ben"), &chat_id, say("hi")).await.unwrap();

    let err = svc.delete_chat(Some("eve"), chat(&chat_id)).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    let err = svc.delete_chat(Some("anna"), chat("nobody_here")).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let response = svc.delete_chat(Some("anna"), chat(&chat_id)).await.unwrap();
    assert!(response.success);
    assert_eq!(response.chat_id, chat_id);
    assert!(env
        .docs
        .messages(ChatCollection::Temporary, &chat_id)
        .await
        .unwrap()
        .is_empty());

    env.stop().await;
}

#[tokio::test]
async fn test_current_match_recreates_lost_session() {
    let (env, chat_id) = matched(Settings::default()).await;

    let mut batch = WriteBatch::new();
    batch.push(WriteOp::DeleteChat {
        collection: ChatCollection::Temporary,
        chat_id: chat_id.clone(),
    });
    env.docs.commit(batch).await.unwrap();

    let view = env.state.service.current_match(Some("ben")).await.unwrap();
    assert_eq!(view.current.unwrap().chat_id, chat_id);
    let session = env
        .docs
        .chat(ChatCollection::Temporary, &chat_id)
        .await
        .unwrap()
        .unwrap();
    assert!(session.has_participant("anna"));
    assert!(session.has_participant("ben"));

    env.stop().await;
}

#[tokio::test]
async fn test_permanent_mode_and_retain_policy() {
    let mut settings = Settings::default();
    settings.chat.initial_mode = SessionMode::Permanent;
    settings.chat.end_policy = EndMatchPolicy::Retain;
    settings.chat.denormalize_profile = true;
    let (env, chat_id) = matched(settings).await;
    let svc = &env.state.service;

    let current = svc.current_match(Some("anna")).await.unwrap().current.unwrap();
    assert_eq!(current.partner_age, Some(24));
    assert_eq!(current.partner_gender.as_deref(), Some("other"));

    let session = env
        .docs
        .chat(ChatCollection::Permanent, &chat_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!session.is_temporary);
    assert_eq!(session.participant_ages["ben"], 24);

    svc.end_match(Some("anna")).await.unwrap();
    assert!(env
        .docs
        .chat(ChatCollection::Permanent, &chat_id)
        .await
        .unwrap()
        .is_some());

    env.stop().await;
}
