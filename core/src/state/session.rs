//! 会话状态

use super::event::{apply_delta, replay, StateUpdateEvent};
use super::types::{AppendOutcome, SessionKey, StateMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// 会话复合主键
    pub key: SessionKey,
    /// 当前状态
    pub state: StateMap,
    /// 创建时初始状态（用于审计重放）
    pub initial_state: StateMap,
    /// 创建时间（只设置一次）
    pub created_at: DateTime<Utc>,
    /// 最后更新时间（单调不减）
    pub last_update_time: DateTime<Utc>,
    /// 已应用事件（按到达顺序）
    pub events: Vec<StateUpdateEvent>,
    #[serde(skip)]
    seen_invocations: HashSet<String>,
}

impl Session {
    /// 创建新会话
    pub fn new(key: SessionKey, initial_state: StateMap) -> Self {
        let now = Utc::now();
        Self {
            key,
            state: initial_state.clone(),
            initial_state,
            created_at: now,
            last_update_time: now,
            events: Vec::new(),
            seen_invocations: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.key.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    /// 应用状态更新事件
    pub fn apply(&mut self, event: StateUpdateEvent) -> AppendOutcome {
        if self.seen_invocations.contains(&event.invocation_id)
            || self
                .events
                .iter()
                .any(|e| e.invocation_id == event.invocation_id)
        {
            return AppendOutcome::Duplicate;
        }

        apply_delta(&mut self.state, &event.state_delta);
        if event.timestamp > self.last_update_time {
            self.last_update_time = event.timestamp;
        }
        self.seen_invocations.insert(event.invocation_id.clone());
        self.events.push(event);
        AppendOutcome::Applied
    }

    /// 从初始状态重放全部事件
    pub fn replayed_state(&self) -> StateMap {
        replay(&self.initial_state, &self.events)
    }

    /// 最近一次写入某个键的事件
    pub fn last_writer_of(&self, key: &str) -> Option<&StateUpdateEvent> {
        self.events
            .iter()
            .rev()
            .find(|e| e.state_delta.contains_key(key))
    }

    /// 空闲时长
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_update_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn key() -> SessionKey {
        SessionKey::new("bank", "CUST001", "s1")
    }

    fn map(v: serde_json::Value) -> StateMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_keeps_untouched_keys() {
        let mut session = Session::new(key(), map(json!({"a": 1, "b": 2})));
        let outcome = session.apply(StateUpdateEvent::system(map(json!({"b": 3}))));
        assert_eq!(outcome, AppendOutcome::Applied);
        assert_eq!(session.state, map(json!({"a": 1, "b": 3})));
        assert_eq!(session.events.len(), 1);
    }

    #[test]
    fn test_duplicate_invocation_is_ignored() {
        let mut session = Session::new(key(), StateMap::new());
        let ev = StateUpdateEvent::system(map(json!({"a": 1}))).with_invocation_id("inv");
        assert_eq!(session.apply(ev.clone()), AppendOutcome::Applied);
        let again = StateUpdateEvent::system(map(json!({"a": 2}))).with_invocation_id("inv");
        assert_eq!(session.apply(again), AppendOutcome::Duplicate);
        assert_eq!(session.state.get("a"), Some(&json!(1)));
        assert_eq!(session.events.len(), 1);
    }

    #[test]
    fn test_last_update_time_is_monotonic() {
        let mut session = Session::new(key(), StateMap::new());
        let created = session.last_update_time;
        let stale = StateUpdateEvent::system(map(json!({"a": 1})))
            .with_timestamp(created - Duration::hours(1));
        session.apply(stale);
        assert_eq!(session.last_update_time, created);

        let fresh = StateUpdateEvent::system(map(json!({"a": 2})))
            .with_timestamp(created + Duration::seconds(5));
        session.apply(fresh);
        assert_eq!(session.last_update_time, created + Duration::seconds(5));
        // 顺序按到达而非时间戳
        assert_eq!(session.state.get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_replayed_state_matches_live_state() {
        let mut session = Session::new(key(), map(json!({"x": 0})));
        session.apply(StateUpdateEvent::new("support_agent", map(json!({"x": 1}))));
        session.apply(StateUpdateEvent::system(map(json!({"y": true}))));
        assert_eq!(session.replayed_state(), session.state);
        assert_eq!(
            session.last_writer_of("x").map(|e| e.author.as_str()),
            Some("support_agent")
        );
        assert!(session.last_writer_of("missing").is_none());
    }
}
