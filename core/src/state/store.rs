//! 内存状态表：进程生命周期内会话状态的唯一权威来源
//!
//! 表级 `RwLock` 保护键空间（创建/删除），每个会话单独一把 `Mutex`
//! 串行化读-改-写，保证同一会话的并发更新不会丢失。

use super::event::{StateDelta, StateUpdateEvent};
use super::session::Session;
use super::types::{AppendOutcome, SessionKey, StateMap};
use crate::error::SessionError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

struct Entry {
    created_at: DateTime<Utc>,
    session: Arc<Mutex<Session>>,
}

/// 内存状态表
#[derive(Default)]
pub struct StateStore {
    sessions: RwLock<HashMap<SessionKey, Entry>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建会话；`session_id` 为空时生成 UUID。键已存在返回 `Conflict`。
    pub async fn create(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        initial_state: StateMap,
    ) -> Result<Session, SessionError> {
        if app_name.trim().is_empty() || user_id.trim().is_empty() {
            return Err(SessionError::Invalid(
                "app_name and user_id must not be empty".to_string(),
            ));
        }

        let session_id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let key = SessionKey::new(app_name, user_id, session_id);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            return Err(key.conflict());
        }

        let session = Session::new(key.clone(), initial_state);
        let snapshot = session.clone();
        sessions.insert(
            key,
            Entry {
                created_at: session.created_at,
                session: Arc::new(Mutex::new(session)),
            },
        );
        Ok(snapshot)
    }

    /// 获取会话快照；不存在返回 `None`
    pub async fn get(&self, key: &SessionKey) -> Option<Session> {
        let handle = self.handle(key).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// 列出 (app, user) 范围内的会话 ID，按创建时间排序
    pub async fn list(&self, app_name: &str, user_id: &str) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut scoped: Vec<_> = sessions
            .iter()
            .filter(|(k, _)| k.in_scope(app_name, user_id))
            .map(|(k, e)| (e.created_at, k.session_id.clone()))
            .collect();
        scoped.sort();
        scoped.into_iter().map(|(_, id)| id).collect()
    }

    /// 删除会话；不存在时返回 `false`
    pub async fn delete(&self, key: &SessionKey) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    /// 追加事件（持有会话锁完成读-改-写）
    pub async fn append(
        &self,
        key: &SessionKey,
        event: StateUpdateEvent,
    ) -> Result<(AppendOutcome, Session), SessionError> {
        let handle = self.handle(key).await.ok_or_else(|| key.not_found())?;
        let mut session = handle.lock().await;
        let outcome = session.apply(event);
        Ok((outcome, session.clone()))
    }

    /// 在会话锁内基于当前状态计算 delta 后追加
    pub async fn append_with<F>(
        &self,
        key: &SessionKey,
        author: &str,
        compute: F,
    ) -> Result<(StateUpdateEvent, Session), SessionError>
    where
        F: FnOnce(&StateMap) -> StateDelta,
    {
        let handle = self.handle(key).await.ok_or_else(|| key.not_found())?;
        let mut session = handle.lock().await;
        let delta = compute(&session.state);
        let event = StateUpdateEvent::new(author, delta);
        session.apply(event.clone());
        Ok((event, session.clone()))
    }

    /// (app, user) 范围内会话及其最后更新时间
    pub async fn scoped_activity(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Vec<(SessionKey, DateTime<Utc>)> {
        let handles: Vec<_> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(k, _)| k.in_scope(app_name, user_id))
                .map(|(k, e)| (k.clone(), e.session.clone()))
                .collect()
        };

        let mut out = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            let last = handle.lock().await.last_update_time;
            out.push((key, last));
        }
        out
    }

    /// 空闲超过 `ttl` 的会话
    pub async fn idle_keys(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<SessionKey> {
        let handles: Vec<_> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(k, e)| (k.clone(), e.session.clone()))
                .collect()
        };

        let mut out = Vec::new();
        for (key, handle) in handles {
            if handle.lock().await.idle_for(now) > ttl {
                out.push(key);
            }
        }
        out
    }

    /// 会话仍空闲超过 `ttl` 时删除；判断与删除之间持有会话锁
    pub async fn remove_if_idle(
        &self,
        key: &SessionKey,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get(key) else {
            return false;
        };
        let handle = entry.session.clone();
        let session = handle.lock().await;
        if session.idle_for(now) <= ttl {
            return false;
        }
        drop(session);
        sessions.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handle(&self, key: &SessionKey) -> Option<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|e| e.session.clone())
    }
}
