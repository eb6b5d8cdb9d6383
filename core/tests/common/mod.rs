#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use bankbot_core::api::{
    AgentReply, AgentRequest, ChatMessageRecord, MemoryArchivePayload, MemoryIndex, MemoryMatch,
    MemorySearchPayload, MirrorHealth, NewChatMessage, SessionConfig, SessionManager,
    SessionMirror, SessionRecord, StateMap, TurnAgent,
};
use chrono::Utc;

pub fn state(v: serde_json::Value) -> StateMap {
    v.as_object().cloned().expect("test state must be an object")
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        side_effect_timeout_ms: 200,
        ..SessionConfig::default()
    }
}

/// 进程内镜像；`fail_writes` 使所有写入失败
///
/// 消息连同所属客户一起保存。
#[derive(Default)]
pub struct RecordingMirror {
    pub sessions: Mutex<HashMap<String, SessionRecord>>,
    pub messages: Mutex<Vec<(String, ChatMessageRecord)>>,
    pub fail_writes: AtomicBool,
    next_id: AtomicI64,
}

impl RecordingMirror {
    pub fn failing() -> Self {
        let m = Self::default();
        m.fail_writes.store(true, Ordering::SeqCst);
        m
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    fn owned_by_other(&self, session_id: &str, customer_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .is_some_and(|r| r.customer_id != customer_id)
    }
}

#[async_trait]
impl SessionMirror for RecordingMirror {
    fn name(&self) -> &str {
        "recording"
    }

    async fn record_session(&self, session_id: &str, customer_id: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        if self.owned_by_other(session_id, customer_id) {
            bail!("session {session_id} is owned by another customer");
        }
        self.sessions
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .and_modify(|r| r.updated_at = Some(Utc::now()))
            .or_insert_with(|| SessionRecord {
                session_id: session_id.to_string(),
                customer_id: customer_id.to_string(),
                created_at: Utc::now(),
                updated_at: None,
            });
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn delete_session(&self, session_id: &str, customer_id: &str) -> anyhow::Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        self.messages
            .lock()
            .unwrap()
            .retain(|(owner, m)| !(m.session_id == session_id && owner == customer_id));
        if self.owned_by_other(session_id, customer_id) {
            return Ok(false);
        }
        Ok(self.sessions.lock().unwrap().remove(session_id).is_some())
    }

    async fn append_message(
        &self,
        customer_id: &str,
        message: NewChatMessage,
    ) -> anyhow::Result<ChatMessageRecord> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        if self.owned_by_other(&message.session_id, customer_id) {
            bail!("session {} is owned by another customer", message.session_id);
        }
        let record = ChatMessageRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            agent_name: message.agent_name,
            created_at: Utc::now(),
        };
        self.messages
            .lock()
            .unwrap()
            .push((customer_id.to_string(), record.clone()));
        Ok(record)
    }

    async fn list_messages(
        &self,
        session_id: &str,
        customer_id: &str,
    ) -> anyhow::Result<Vec<ChatMessageRecord>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(owner, m)| m.session_id == session_id && owner == customer_id)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn health(&self) -> MirrorHealth {
        MirrorHealth::healthy("recording")
    }
}

/// 记录归档内容、可切换为失败的记忆索引
#[derive(Default)]
pub struct RecordingIndex {
    pub archived: Mutex<Vec<MemoryArchivePayload>>,
    pub fail: AtomicBool,
    pub searches: AtomicUsize,
}

impl RecordingIndex {
    pub fn failing() -> Self {
        let idx = Self::default();
        idx.fail.store(true, Ordering::SeqCst);
        idx
    }
}

#[async_trait]
impl MemoryIndex for RecordingIndex {
    fn name(&self) -> &str {
        "recording"
    }

    async fn add_session(&self, payload: MemoryArchivePayload) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("vector store unavailable");
        }
        let mut archived = self.archived.lock().unwrap();
        archived.retain(|p| p.session_id != payload.session_id);
        archived.push(payload);
        Ok(())
    }

    async fn search(&self, payload: MemorySearchPayload) -> anyhow::Result<Vec<MemoryMatch>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("vector store unavailable");
        }
        let query = payload.query.to_lowercase();
        Ok(self
            .archived
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.app_name == payload.app_name && p.user_id == payload.user_id)
            .filter(|p| {
                query
                    .split_whitespace()
                    .any(|w| p.content.to_lowercase().contains(w))
            })
            .take(payload.limit)
            .map(|p| MemoryMatch {
                session_id: p.session_id.clone(),
                content: p.content.clone(),
                score: 1.0,
                archived_at: Some(p.archived_at),
                metadata: serde_json::Value::Null,
            })
            .collect())
    }
}

/// 按顺序返回预置回复并记录每个请求的 agent
#[derive(Default)]
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<anyhow::Result<AgentReply>>>,
    pub requests: Mutex<Vec<AgentRequest>>,
    pub delay_ms: u64,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    pub fn push(&self, reply: AgentReply) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn push_err(&self, msg: &str) -> &Self {
        self.replies.lock().unwrap().push_back(Err(anyhow!(msg.to_string())));
        self
    }
}

#[async_trait]
impl TurnAgent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run_turn(&self, request: AgentRequest) -> anyhow::Result<AgentReply> {
        self.requests.lock().unwrap().push(request);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(AgentReply::text("How else can I help?")))
    }
}

pub fn manager_with(
    mirror: Option<Arc<RecordingMirror>>,
    index: Option<Arc<RecordingIndex>>,
) -> SessionManager {
    SessionManager::new(
        fast_config(),
        mirror.map(|m| m as Arc<dyn SessionMirror>),
        index.map(|i| i as Arc<dyn MemoryIndex>),
    )
}
