//! 状态更新协议：以只追加的事件序列修改会话状态
//!
//! 每个事件携带一个浅合并的 `state_delta`：delta 中的键整体替换会话状态中的同名键，
//! 未出现的键保持不变。事件按到达顺序应用，时间戳仅作为元数据。

use super::types::StateMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// 系统作者
pub const SYSTEM_AUTHOR: &str = "system";

pub const KEY_ACTIVE_OPERATIONS: &str = "active_operations";
pub const KEY_CONVERSATION_HISTORY: &str = "conversation_history";
pub const KEY_AGENT_SWITCHES: &str = "agent_switches";
pub const KEY_LAST_AGENT: &str = "last_agent";
pub const KEY_LAST_KNOWLEDGE_SEARCH: &str = "last_knowledge_search";
pub const KEY_LAST_GENERAL_INQUIRY: &str = "last_general_inquiry";
pub const KEY_INQUIRY_HISTORY: &str = "inquiry_history";

/// 状态更新事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdateEvent {
    pub invocation_id: String,
    pub author: String,
    pub state_delta: StateMap,
    pub timestamp: DateTime<Utc>,
}

impl StateUpdateEvent {
    pub fn new(author: impl Into<String>, delta: impl Into<StateMap>) -> Self {
        Self {
            invocation_id: format!("state_update_{}", Uuid::new_v4()),
            author: author.into(),
            state_delta: delta.into(),
            timestamp: Utc::now(),
        }
    }

    /// 以 "system" 身份创建事件
    pub fn system(delta: impl Into<StateMap>) -> Self {
        Self::new(SYSTEM_AUTHOR, delta)
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = invocation_id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn delta_keys(&self) -> Vec<String> {
        self.state_delta.keys().cloned().collect()
    }
}

/// 浅合并：delta 中的每个键整体替换
pub fn apply_delta(state: &mut StateMap, delta: &StateMap) {
    for (k, v) in delta {
        state.insert(k.clone(), v.clone());
    }
}

/// 从初始状态按顺序重放事件，重复的 invocation_id 只应用一次
pub fn replay(initial: &StateMap, events: &[StateUpdateEvent]) -> StateMap {
    let mut state = initial.clone();
    let mut seen = HashSet::new();
    for ev in events {
        if seen.insert(ev.invocation_id.as_str()) {
            apply_delta(&mut state, &ev.state_delta);
        }
    }
    state
}

/// 状态增量构建器（键为自由字符串）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta(StateMap);

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn merge(mut self, other: StateDelta) -> Self {
        apply_delta(&mut self.0, &other.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &StateMap {
        &self.0
    }

    pub fn into_inner(self) -> StateMap {
        self.0
    }
}

impl From<StateMap> for StateDelta {
    fn from(map: StateMap) -> Self {
        Self(map)
    }
}

impl From<StateDelta> for StateMap {
    fn from(delta: StateDelta) -> Self {
        delta.0
    }
}

/// 已知功能的类型化增量，避免自由键冲突
#[derive(Debug, Clone, PartialEq)]
pub enum KnownDelta {
    /// 知识库检索记录
    KnowledgeSearch {
        query: String,
        category: Option<String>,
        results_count: usize,
    },
    /// 一般咨询：记录最近一次并追加到咨询历史
    GeneralInquiry { inquiry_type: String },
    /// 添加活动操作标签（如 "card_blocked"）
    AddActiveOperation(String),
    /// 移除活动操作标签
    RemoveActiveOperation(String),
    /// 一轮对话结束：记录处理的 agent 与切换次数
    TurnCompleted { agent_name: String },
}

impl KnownDelta {
    /// 基于当前状态计算 delta（需在会话锁内调用以保证追加类更新不丢失）
    pub fn to_delta(&self, current: &StateMap, now: DateTime<Utc>) -> StateDelta {
        match self {
            Self::KnowledgeSearch {
                query,
                category,
                results_count,
            } => StateDelta::new().set(
                KEY_LAST_KNOWLEDGE_SEARCH,
                json!({
                    "query": query,
                    "category": category,
                    "results_count": results_count,
                    "timestamp": now.to_rfc3339(),
                }),
            ),
            Self::GeneralInquiry { inquiry_type } => {
                let mut history = string_list(current, KEY_INQUIRY_HISTORY);
                history.push(inquiry_type.clone());
                StateDelta::new()
                    .set(
                        KEY_LAST_GENERAL_INQUIRY,
                        json!({ "type": inquiry_type, "timestamp": now.to_rfc3339() }),
                    )
                    .set(KEY_INQUIRY_HISTORY, history)
            }
            Self::AddActiveOperation(tag) => {
                let mut ops = string_list(current, KEY_ACTIVE_OPERATIONS);
                if !ops.iter().any(|op| op == tag) {
                    ops.push(tag.clone());
                }
                StateDelta::new().set(KEY_ACTIVE_OPERATIONS, ops)
            }
            Self::RemoveActiveOperation(tag) => {
                let ops: Vec<String> = string_list(current, KEY_ACTIVE_OPERATIONS)
                    .into_iter()
                    .filter(|op| op != tag)
                    .collect();
                StateDelta::new().set(KEY_ACTIVE_OPERATIONS, ops)
            }
            Self::TurnCompleted { agent_name } => {
                let previous = current
                    .get(KEY_LAST_AGENT)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let mut switches = current
                    .get(KEY_AGENT_SWITCHES)
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if previous.as_deref().is_some_and(|p| p != agent_name) {
                    switches += 1;
                }
                let mut history = match current.get(KEY_CONVERSATION_HISTORY) {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                history.push(json!({ "agent": agent_name, "timestamp": now.to_rfc3339() }));
                StateDelta::new()
                    .set(KEY_LAST_AGENT, agent_name.as_str())
                    .set(KEY_AGENT_SWITCHES, switches)
                    .set(KEY_CONVERSATION_HISTORY, history)
            }
        }
    }
}

/// 读取字符串数组，缺失或类型不符时返回空
pub fn string_list(state: &StateMap, key: &str) -> Vec<String> {
    match state.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(v: Value) -> StateMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_delta_replaces_whole_key() {
        let mut state = map(json!({"context": {"a": 1, "b": 2}, "keep": true}));
        apply_delta(&mut state, &map(json!({"context": {"a": 9}})));
        assert_eq!(state, map(json!({"context": {"a": 9}, "keep": true})));
    }

    #[test]
    fn test_replay_last_writer_wins_per_key() {
        let initial = map(json!({"x": 0, "y": 0}));
        let events = vec![
            StateUpdateEvent::system(map(json!({"x": 1}))),
            StateUpdateEvent::system(map(json!({"y": 2, "z": 1}))),
            StateUpdateEvent::system(map(json!({"x": 3}))),
        ];
        let a = replay(&initial, &events);
        let b = replay(&initial, &events);
        assert_eq!(a, b);
        assert_eq!(a, map(json!({"x": 3, "y": 2, "z": 1})));
    }

    #[test]
    fn test_replay_skips_duplicate_invocation() {
        let initial = StateMap::new();
        let first = StateUpdateEvent::system(map(json!({"n": 1}))).with_invocation_id("inv-1");
        let dup = StateUpdateEvent::system(map(json!({"n": 2}))).with_invocation_id("inv-1");
        let state = replay(&initial, &[first, dup]);
        assert_eq!(state.get("n"), Some(&json!(1)));
    }

    #[test]
    fn test_add_and_remove_active_operation() {
        let now = Utc::now();
        let mut state = map(json!({"active_operations": ["recent_transfer"]}));

        let delta = KnownDelta::AddActiveOperation("card_blocked".into()).to_delta(&state, now);
        apply_delta(&mut state, delta.as_map());
        let delta = KnownDelta::AddActiveOperation("card_blocked".into()).to_delta(&state, now);
        apply_delta(&mut state, delta.as_map());
        assert_eq!(
            string_list(&state, KEY_ACTIVE_OPERATIONS),
            vec!["recent_transfer".to_string(), "card_blocked".to_string()]
        );

        let delta = KnownDelta::RemoveActiveOperation("recent_transfer".into()).to_delta(&state, now);
        apply_delta(&mut state, delta.as_map());
        assert_eq!(
            string_list(&state, KEY_ACTIVE_OPERATIONS),
            vec!["card_blocked".to_string()]
        );
    }

    #[test]
    fn test_general_inquiry_appends_history() {
        let state = map(json!({"inquiry_history": ["fees"]}));
        let delta = KnownDelta::GeneralInquiry {
            inquiry_type: "branches".into(),
        }
        .to_delta(&state, Utc::now());
        assert_eq!(
            delta.as_map().get(KEY_INQUIRY_HISTORY),
            Some(&json!(["fees", "branches"]))
        );
        assert!(delta.as_map().contains_key(KEY_LAST_GENERAL_INQUIRY));
    }

    #[test]
    fn test_turn_completed_counts_agent_switches() {
        let now = Utc::now();
        let mut state = StateMap::new();
        for agent in ["coordinator", "coordinator", "loan_agent", "support_agent"] {
            let delta = KnownDelta::TurnCompleted {
                agent_name: agent.into(),
            }
            .to_delta(&state, now);
            apply_delta(&mut state, delta.as_map());
        }
        assert_eq!(state.get(KEY_AGENT_SWITCHES), Some(&json!(2)));
        assert_eq!(
            state
                .get(KEY_CONVERSATION_HISTORY)
                .and_then(Value::as_array)
                .map(Vec::len),
            Some(4)
        );
        assert_eq!(state.get(KEY_LAST_AGENT), Some(&json!("support_agent")));
    }

    #[test]
    fn test_state_delta_builder() {
        let delta = StateDelta::new()
            .set("a", 1)
            .merge(StateDelta::new().set("a", 2).set("b", "x"));
        assert_eq!(delta.into_inner(), map(json!({"a": 2, "b": "x"})));
    }
}
