// =============
// tests/integration/cleanup_flow_tests.rs
// =============
//! Departures and stale entry eviction.
use chrono::{TimeDelta, Utc};

use crate::test_utils::{eventually, join_request, TestEnv};
use roulette_backend_lib::config::Settings;
use roulette_backend_lib::store::KeyedStore;
use roulette_common::{QueueEntry, QueueStatus};

fn aged_entry(uid: &str, age: u32, joined_minutes_ago: i64) -> QueueEntry {
    QueueEntry {
        uid: uid.to_string(),
        name: uid.to_string(),
        age,
        gender: "other".to_string(),
        interests: Default::default(),
        status: QueueStatus::Searching,
        joined_at: Utc::now() - TimeDelta::minutes(joined_minutes_ago),
    }
}

#[tokio::test]
async fn test_leaving_releases_partner() {
    let env = TestEnv::running(Settings::default());
    let svc = &env.state.service;
    svc.join_queue(Some("kim"), join_request("Kim", 30, &["tea"]))
        .await
        .unwrap();
    svc.join_queue(Some("lee"), join_request("Lee", 31, &["tea"]))
        .await
        .unwrap();

    let keyed = &env.keyed;
    let chats = &env.state.chats;
    assert!(eventually(|| async move { keyed.match_record("lee").await.unwrap().is_some() }).await);
    assert!(eventually(|| async move { chats.exists("kim_lee").await.unwrap() }).await);

    svc.leave_queue(Some("kim")).await.unwrap();

    assert!(
        eventually(|| async move {
            keyed.match_record("lee").await.unwrap().is_none()
                && keyed.match_record("kim").await.unwrap().is_none()
        })
        .await
    );
    let lee = keyed.queue_entry("lee").await.unwrap().unwrap();
    assert_eq!(lee.status, QueueStatus::Searching);
    assert!(keyed.queue_entry("kim").await.unwrap().is_none());
    assert!(eventually(|| async move { !chats.exists("kim_lee").await.unwrap() }).await);

    env.stop().await;
}

#[tokio::test]
async fn test_leaving_releases_partner_with_no_dispatcher() {
    let env = TestEnv::idle(Settings::default());
    let svc = &env.state.service;
    let kim = svc
        .join_queue(Some("kim"), join_request("Kim", 30, &["tea"]))
        .await
        .unwrap();
    let lee = svc
        .join_queue(Some("lee"), join_request("Lee", 31, &["tea"]))
        .await
        .unwrap();
    env.state.lifecycle.create_match(&kim, &lee).await.unwrap();

    svc.leave_queue(Some("kim")).await.unwrap();

    assert!(env.keyed.match_record("kim").await.unwrap().is_none());
    assert!(env.keyed.match_record("lee").await.unwrap().is_none());
    let lee = env.keyed.queue_entry("lee").await.unwrap().unwrap();
    assert_eq!(lee.status, QueueStatus::Searching);
    assert!(!env.state.chats.exists("kim_lee").await.unwrap());
}

#[tokio::test]
async fn test_sweep_evicts_by_age() {
    let env = TestEnv::idle(Settings::default());
    env.keyed.put_queue_entry(aged_entry("stale", 30, 120)).await.unwrap();
    env.keyed.put_queue_entry(aged_entry("recent", 60, 30)).await.unwrap();

    let report = env.state.sweeper.sweep_once(Utc::now()).await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.evicted, 1);

    assert!(env.keyed.queue_entry("stale").await.unwrap().is_none());
    assert!(env.keyed.queue_entry("recent").await.unwrap().is_some());
}

#[tokio::test]
async fn test_sweep_of_matched_user_frees_partner() {
    let env = TestEnv::idle(Settings::default());
    let keyed = &env.keyed;

    // Matched long ago; only one side is stale
    let ghost = aged_entry("ghost", 40, 180);
    let active = aged_entry("active", 42, 10);
    keyed.put_queue_entry(ghost.clone()).await.unwrap();
    keyed.put_queue_entry(active.clone()).await.unwrap();
    env.state.lifecycle.create_match(&ghost, &active).await.unwrap();

    let report = env.state.sweeper.sweep_once(Utc::now()).await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(report.dissolved, 1);

    assert!(keyed.queue_entry("ghost").await.unwrap().is_none());
    assert!(keyed.match_record("ghost").await.unwrap().is_none());
    assert!(keyed.match_record("active").await.unwrap().is_none());
    let active = keyed.queue_entry("active").await.unwrap().unwrap();
    assert_eq!(active.status, QueueStatus::Searching);
    assert!(!env.state.chats.exists("active_ghost").await.unwrap());
}
