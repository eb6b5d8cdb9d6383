mod common;

use std::sync::Arc;

use bankbot_core::api::{
    AppendOutcome, EvictionReason, KnownDelta, NewChatMessage, SessionConfig, SessionKey,
    SessionManager, SessionMirror, StateEvent, StateUpdateEvent,
};
use bankbot_core::state::string_list;
use common::{fast_config, manager_with, state, RecordingIndex, RecordingMirror};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn card_blocked_scenario_round_trip() {
    let mirror = Arc::new(RecordingMirror::default());
    let manager = manager_with(Some(mirror.clone()), None);

    let session = manager
        .create_session(
            "bank",
            "CUST001",
            Some("s1"),
            Some(state(json!({"customer_id": "CUST001", "active_operations": []}))),
        )
        .await
        .expect("create");
    assert!(mirror.has_session("s1"));

    let updated = manager
        .update_session_state(
            &session.key,
            state(json!({"active_operations": ["card_blocked"]})),
        )
        .await
        .expect("update");
    assert_eq!(
        string_list(&updated.state, "active_operations"),
        vec!["card_blocked".to_string()]
    );

    let fetched = manager
        .get_session(&SessionKey::new("bank", "CUST001", "s1"))
        .await
        .expect("session present");
    assert_eq!(
        fetched.state,
        state(json!({"customer_id": "CUST001", "active_operations": ["card_blocked"]}))
    );
    assert_eq!(fetched.events.len(), 1);
    assert_eq!(fetched.events[0].author, "system");
    assert_eq!(fetched.replayed_state(), fetched.state);
}

#[tokio::test]
async fn duplicate_creation_is_rejected() {
    let manager = SessionManager::default();
    manager
        .create_session("bank", "CUST001", Some("s1"), None)
        .await
        .unwrap();
    let err = manager
        .create_session("bank", "CUST001", Some("s1"), None)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(manager.list_sessions("bank", "CUST001").await, vec!["s1"]);
}

#[tokio::test]
async fn concurrent_get_or_create_converges_on_one_session() {
    let manager = SessionManager::default();
    let tasks = (0..8).map(|_| {
        let manager = manager.clone();
        async move {
            manager
                .get_or_create_session("bank", "CUST001", Some("race"), None)
                .await
        }
    });
    let results = futures::future::join_all(tasks).await;

    let created = results
        .iter()
        .filter(|r| matches!(r, Ok((_, true))))
        .count();
    assert_eq!(created, 1);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(manager.list_sessions("bank", "CUST001").await.len(), 1);
}

#[tokio::test]
async fn concurrent_non_overlapping_deltas_both_land() {
    let manager = SessionManager::default();
    let key = manager
        .create_session("bank", "u", Some("s"), Some(state(json!({"base": true}))))
        .await
        .unwrap()
        .key;

    let a = {
        let manager = manager.clone();
        let key = key.clone();
        tokio::spawn(async move {
            manager
                .update_session_state(&key, state(json!({"a": 1})))
                .await
        })
    };
    let b = {
        let manager = manager.clone();
        let key = key.clone();
        tokio::spawn(async move {
            manager
                .update_session_state(&key, state(json!({"b": 2})))
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let session = manager.get_session(&key).await.unwrap();
    assert_eq!(session.state, state(json!({"base": true, "a": 1, "b": 2})));
}

#[tokio::test]
async fn absent_sessions_are_safe() {
    let manager = SessionManager::default();
    let key = SessionKey::new("bank", "nobody", "missing");
    assert!(manager.get_session(&key).await.is_none());
    assert!(manager
        .update_session_state(&key, state(json!({"x": 1})))
        .await
        .is_none());
    assert!(!manager.delete_session(&key).await);
    assert!(manager.list_sessions("bank", "nobody").await.is_empty());
}

#[tokio::test]
async fn memory_failure_does_not_block_delete() {
    let mirror = Arc::new(RecordingMirror::default());
    let index = Arc::new(RecordingIndex::failing());
    let manager = manager_with(Some(mirror.clone()), Some(index.clone()));
    let mut events = manager.subscribe();

    let key = manager
        .create_session("bank", "CUST001", Some("s1"), None)
        .await
        .unwrap()
        .key;

    assert!(!manager.add_session_to_memory(&key).await);
    assert!(manager.delete_session(&key).await);
    assert!(manager.get_session(&key).await.is_none());
    assert!(!mirror.has_session("s1"));

    let mut saw_index_failure = false;
    while let Ok(ev) = events.try_recv() {
        if matches!(ev, StateEvent::MemoryIndexFailed { .. }) {
            saw_index_failure = true;
        }
    }
    assert!(saw_index_failure);
}

#[tokio::test]
async fn shared_session_id_is_isolated_between_customers() {
    let mirror = Arc::new(RecordingMirror::default());
    let manager = manager_with(Some(mirror.clone()), None);

    let a = manager
        .create_session("bank", "CUST_A", Some("s1"), None)
        .await
        .unwrap()
        .key;
    manager
        .record_message("CUST_A", NewChatMessage::user("s1", "what is my balance"))
        .await
        .expect("owner can write");

    // 其他客户删除同名 id 只影响自己名下
    let b = SessionKey::new("bank", "CUST_B", "s1");
    assert!(!manager.delete_session(&b).await);
    assert!(manager.get_session(&a).await.is_some());
    assert_eq!(manager.transcript(&a).await.len(), 1);
    assert!(manager.transcript(&b).await.is_empty());

    // 其内存会话可以创建，但镜像记录仍归原客户
    manager
        .create_session("bank", "CUST_B", Some("s1"), None)
        .await
        .expect("in-memory sessions are scoped per user");
    assert_eq!(manager.stats().await.mirror_failures_total, 1);
    let record = mirror.get_session("s1").await.unwrap().unwrap();
    assert_eq!(record.customer_id, "CUST_A");
    assert!(manager
        .record_message("CUST_B", NewChatMessage::user("s1", "hi"))
        .await
        .is_none());
    assert_eq!(manager.transcript(&a).await.len(), 1);
}

#[tokio::test]
async fn expired_sessions_keep_their_transcript() {
    let mirror = Arc::new(RecordingMirror::default());
    let config = SessionConfig {
        session_timeout_hours: 0,
        ..fast_config()
    };
    let manager = SessionManager::new(config, Some(mirror.clone() as Arc<dyn SessionMirror>), None);
    let mut events = manager.subscribe();

    let key = manager
        .create_session("bank", "CUST001", Some("s1"), None)
        .await
        .unwrap()
        .key;
    manager
        .record_message("CUST001", NewChatMessage::user("s1", "close my account"))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(manager.cleanup_expired_sessions().await, 1);
    assert!(manager.get_session(&key).await.is_none());

    assert!(mirror.has_session("s1"));
    let transcript = manager.transcript(&key).await;
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].content, "close my account");

    let mut expired = false;
    while let Ok(ev) = events.try_recv() {
        if let StateEvent::SessionEvicted { reason, .. } = ev {
            expired = reason == EvictionReason::Expired;
        }
    }
    assert!(expired);

    // 显式删除仍会清除持久化记录
    assert!(!manager.delete_session(&key).await);
    assert!(!mirror.has_session("s1"));
    assert!(manager.transcript(&key).await.is_empty());
}

#[tokio::test]
async fn mirror_failure_does_not_block_create() {
    let mirror = Arc::new(RecordingMirror::failing());
    let manager = manager_with(Some(mirror.clone()), None);

    let session = manager
        .create_session("bank", "CUST001", Some("s1"), None)
        .await
        .expect("create survives mirror failure");
    assert!(manager.get_session(&session.key).await.is_some());
    assert!(!mirror.has_session("s1"));
    assert_eq!(manager.stats().await.mirror_failures_total, 1);

    // 删除仍会移除内存会话
    assert!(manager.delete_session(&session.key).await);
}

#[tokio::test]
async fn archived_sessions_are_searchable_per_user() {
    let index = Arc::new(RecordingIndex::default());
    let manager = manager_with(None, Some(index.clone()));

    let key = manager
        .create_session(
            "bank",
            "CUST001",
            Some("loan-chat"),
            Some(state(json!({"topic": "mortgage refinancing"}))),
        )
        .await
        .unwrap()
        .key;
    assert!(manager.add_session_to_memory(&key).await);
    // 重复归档替换旧条目
    assert!(manager.add_session_to_memory(&key).await);
    assert_eq!(index.archived.lock().unwrap().len(), 1);

    let hits = manager
        .search_memory("bank", "CUST001", "mortgage", 5)
        .await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].session_id, "loan-chat");

    assert!(manager
        .search_memory("bank", "CUST002", "mortgage", 5)
        .await
        .is_empty());
}

#[tokio::test]
async fn search_failure_yields_empty() {
    let index = Arc::new(RecordingIndex::failing());
    let manager = manager_with(None, Some(index.clone()));
    assert!(manager
        .search_memory("bank", "CUST001", "card", 3)
        .await
        .is_empty());
    assert_eq!(index.searches.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn authored_events_are_idempotent_by_invocation_id() {
    let manager = SessionManager::default();
    let key = manager
        .create_session("bank", "u", Some("s"), None)
        .await
        .unwrap()
        .key;

    let ev = StateUpdateEvent::new("card_operations_agent", state(json!({"card_status": "blocked"})))
        .with_invocation_id("tool-call-7");
    let (first, _) = manager.append_event(&key, ev.clone()).await.unwrap();
    let (second, session) = manager.append_event(&key, ev).await.unwrap();
    assert_eq!(first, AppendOutcome::Applied);
    assert_eq!(second, AppendOutcome::Duplicate);
    assert_eq!(session.events.len(), 1);
    assert_eq!(manager.stats().await.updates_total, 1);
}

#[tokio::test]
async fn known_deltas_compose_with_free_form_updates() {
    let manager = SessionManager::default();
    let key = manager
        .create_session("bank", "CUST001", Some("s"), None)
        .await
        .unwrap()
        .key;

    manager
        .apply_known_delta(
            &key,
            "support_agent",
            &KnownDelta::GeneralInquiry {
                inquiry_type: "fees".into(),
            },
        )
        .await
        .unwrap();
    manager
        .apply_known_delta(
            &key,
            "support_agent",
            &KnownDelta::GeneralInquiry {
                inquiry_type: "branches".into(),
            },
        )
        .await
        .unwrap();
    let session = manager
        .update_session_state(&key, state(json!({"note": "vip"})))
        .await
        .unwrap();

    assert_eq!(
        string_list(&session.state, "inquiry_history"),
        vec!["fees".to_string(), "branches".to_string()]
    );
    assert_eq!(session.state["note"], json!("vip"));
    assert_eq!(
        session.last_writer_of("inquiry_history").map(|e| e.author.as_str()),
        Some("support_agent")
    );
}
