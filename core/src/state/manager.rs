//! 会话生命周期管理器
//!
//! 调用方唯一接触的组件：组合内存状态表、持久化镜像与长期记忆索引。
//! 内存状态先于一切副作用更新；镜像与记忆写入是尽力而为的，失败只记录日志并广播事件，
//! 不影响会话本身，也不会让一轮对话失败。

use super::event::{KnownDelta, StateDelta, StateUpdateEvent, KEY_ACTIVE_OPERATIONS};
use super::session::Session;
use super::store::StateStore;
use super::types::{AppendOutcome, EvictionReason, SessionKey, SessionStats, StateEvent, StateMap};
use crate::config::SessionConfig;
use crate::error::{MemoryIndexError, MirrorError, SessionError};
use crate::memory::{build_archive_payload, MemoryIndex, MemoryMatch, MemorySearchPayload};
use crate::mirror::{ChatMessageRecord, MirrorHealth, NewChatMessage, SessionMirror};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const LOG_TARGET: &str = "bankbot.session";

/// 会话生命周期管理器
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    config: SessionConfig,
    store: StateStore,
    mirror: Option<Arc<dyn SessionMirror>>,
    memory: Option<Arc<dyn MemoryIndex>>,
    stats: RwLock<SessionStats>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl SessionManager {
    /// 创建管理器；镜像与记忆索引均可选
    pub fn new(
        config: SessionConfig,
        mirror: Option<Arc<dyn SessionMirror>>,
        memory: Option<Arc<dyn MemoryIndex>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        let inner = SessionManagerInner {
            config,
            store: StateStore::new(),
            mirror,
            memory,
            stats: RwLock::new(SessionStats::default()),
            cleanup_task: Mutex::new(None),
            event_tx,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// 仅内存状态，无镜像与记忆索引
    pub fn in_memory(config: SessionConfig) -> Self {
        Self::new(config, None, None)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn mirror(&self) -> Option<Arc<dyn SessionMirror>> {
        self.inner.mirror.clone()
    }

    pub fn memory(&self) -> Option<Arc<dyn MemoryIndex>> {
        self.inner.memory.clone()
    }

    /// 订阅状态事件
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.event_tx.subscribe()
    }

    fn emit_event(&self, event: StateEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    /// 启动：自检并启动过期清理任务
    pub async fn init(&self) -> Result<(), SessionError> {
        self.self_check("system_test").await?;

        let interval = Duration::from_secs(self.inner.config.cleanup_interval_secs.max(1));
        let handle = self.spawn_cleanup(interval);
        if let Some(previous) = self.inner.cleanup_task.lock().await.replace(handle) {
            previous.abort();
        }

        self.emit_event(StateEvent::ServiceStarted {
            timestamp: Utc::now(),
        });
        info!(target: LOG_TARGET, "session service initialized");
        Ok(())
    }

    /// 关闭：停止后台任务
    pub async fn shutdown(&self) {
        if let Some(handle) = self.inner.cleanup_task.lock().await.take() {
            handle.abort();
        }
        self.emit_event(StateEvent::ServiceShutdown {
            timestamp: Utc::now(),
        });
        info!(target: LOG_TARGET, "session service shut down");
    }

    /// 创建并删除一个自检会话，验证会话服务可用
    pub async fn self_check(&self, check_user: &str) -> Result<(), SessionError> {
        let check_id = format!("self_check_{}", Uuid::new_v4());
        let session = self
            .inner
            .store
            .create("bankbot_self_check", check_user, Some(&check_id), StateMap::new())
            .await?;
        if !self.inner.store.delete(&session.key).await {
            return Err(SessionError::Invalid(format!(
                "self-check session {} vanished before delete",
                session.key
            )));
        }
        Ok(())
    }

    /// 默认初始状态
    pub fn default_state(&self, user_id: &str) -> StateMap {
        let state = json!({
            "customer_id": user_id,
            "conversation_start": Utc::now().to_rfc3339(),
            "context": {
                "preferred_language": self.inner.config.preferred_language,
                "banking_context": true,
                "session_type": "customer_service"
            },
            "user_preferences": {},
            KEY_ACTIVE_OPERATIONS: []
        });
        match state {
            Value::Object(map) => map,
            _ => StateMap::new(),
        }
    }

    /// 创建会话
    ///
    /// 未提供 `initial_state` 时使用默认状态。镜像写入失败只记录日志，会话照常返回。
    pub async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        initial_state: Option<StateMap>,
    ) -> Result<Session, SessionError> {
        if let Some(id) = session_id.map(str::trim).filter(|s| !s.is_empty()) {
            let key = SessionKey::new(app_name, user_id, id);
            if self.inner.store.get(&key).await.is_some() {
                return Err(key.conflict());
            }
        }

        self.enforce_user_limit(app_name, user_id).await;

        let state = initial_state.unwrap_or_else(|| self.default_state(user_id));
        let session = self
            .inner
            .store
            .create(app_name, user_id, session_id, state)
            .await?;

        {
            let mut stats = self.inner.stats.write().await;
            stats.created_total += 1;
        }
        self.emit_event(StateEvent::SessionCreated {
            key: session.key.clone(),
            timestamp: Utc::now(),
        });
        info!(
            target: LOG_TARGET,
            session = %session.key,
            "created session"
        );

        if let Some(mirror) = self.inner.mirror.as_ref() {
            let res = self
                .bounded(mirror.record_session(session.id(), user_id), |ms| {
                    MirrorError::Timeout(ms).into()
                })
                .await;
            if let Err(e) = res {
                self.mirror_failed(session.id(), "record_session", &e).await;
            }
        }

        Ok(session)
    }

    /// 获取会话；任何异常都转换为 `None`
    pub async fn get_session(&self, key: &SessionKey) -> Option<Session> {
        self.inner.store.get(key).await
    }

    /// 获取或创建会话；返回 (会话, 是否新建)
    ///
    /// 并发创建同一会话时，输掉竞争的一方复用已创建的会话。
    pub async fn get_or_create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        initial_state: Option<StateMap>,
    ) -> Result<(Session, bool), SessionError> {
        if let Some(id) = session_id.map(str::trim).filter(|s| !s.is_empty()) {
            let key = SessionKey::new(app_name, user_id, id);
            if let Some(existing) = self.get_session(&key).await {
                return Ok((existing, false));
            }
            return match self
                .create_session(app_name, user_id, Some(id), initial_state)
                .await
            {
                Ok(session) => Ok((session, true)),
                Err(e) if e.is_conflict() => self
                    .get_session(&key)
                    .await
                    .map(|s| (s, false))
                    .ok_or_else(|| key.not_found()),
                Err(e) => Err(e),
            };
        }

        let session = self
            .create_session(app_name, user_id, None, initial_state)
            .await?;
        Ok((session, true))
    }

    /// 以 "system" 身份追加状态增量；失败只记录日志，返回 `None`
    pub async fn update_session_state(
        &self,
        key: &SessionKey,
        delta: impl Into<StateMap>,
    ) -> Option<Session> {
        let event = StateUpdateEvent::system(delta);
        match self.append_event(key, event).await {
            Ok((_, session)) => Some(session),
            Err(e) => {
                self.update_failed(key, &e).await;
                None
            }
        }
    }

    /// 严格协议入口：追加由调用方（工具/agent）构造的事件
    pub async fn append_event(
        &self,
        key: &SessionKey,
        event: StateUpdateEvent,
    ) -> Result<(AppendOutcome, Session), SessionError> {
        let invocation_id = event.invocation_id.clone();
        let author = event.author.clone();
        let keys = event.delta_keys();

        let (outcome, session) = self.inner.store.append(key, event).await?;
        match outcome {
            AppendOutcome::Applied => {
                self.inner.stats.write().await.updates_total += 1;
                debug!(
                    target: LOG_TARGET,
                    session = %key,
                    invocation_id = %invocation_id,
                    author = %author,
                    keys = ?keys,
                    "applied state update"
                );
                self.emit_event(StateEvent::StateUpdated {
                    key: key.clone(),
                    invocation_id,
                    author,
                    keys,
                    timestamp: Utc::now(),
                });
            }
            AppendOutcome::Duplicate => {
                debug!(
                    target: LOG_TARGET,
                    session = %key,
                    invocation_id = %invocation_id,
                    "ignored duplicate state update"
                );
            }
        }
        Ok((outcome, session))
    }

    /// 应用类型化增量（在会话锁内基于当前状态计算）
    pub async fn apply_known_delta(
        &self,
        key: &SessionKey,
        author: &str,
        known: &KnownDelta,
    ) -> Option<Session> {
        self.update_session_state_with(key, author, |state| known.to_delta(state, Utc::now()))
            .await
    }

    /// 在会话锁内计算并追加增量；失败只记录日志
    pub async fn update_session_state_with<F>(
        &self,
        key: &SessionKey,
        author: &str,
        compute: F,
    ) -> Option<Session>
    where
        F: FnOnce(&StateMap) -> StateDelta,
    {
        match self.inner.store.append_with(key, author, compute).await {
            Ok((event, session)) => {
                self.inner.stats.write().await.updates_total += 1;
                self.emit_event(StateEvent::StateUpdated {
                    key: key.clone(),
                    keys: event.delta_keys(),
                    invocation_id: event.invocation_id,
                    author: event.author,
                    timestamp: Utc::now(),
                });
                Some(session)
            }
            Err(e) => {
                self.update_failed(key, &e).await;
                None
            }
        }
    }

    /// 列出用户的会话 ID
    pub async fn list_sessions(&self, app_name: &str, user_id: &str) -> Vec<String> {
        self.inner.store.list(app_name, user_id).await
    }

    /// 删除会话（内存与该用户名下的镜像记录）；返回内存中是否存在
    pub async fn delete_session(&self, key: &SessionKey) -> bool {
        let removed = self.inner.store.delete(key).await;
        if removed {
            self.inner.stats.write().await.deleted_total += 1;
            self.emit_event(StateEvent::SessionDeleted {
                key: key.clone(),
                timestamp: Utc::now(),
            });
            info!(target: LOG_TARGET, session = %key, "deleted session");
        } else {
            debug!(target: LOG_TARGET, session = %key, "delete of absent session");
        }

        self.delete_mirrored(key).await;
        removed
    }

    /// 以 `customer_id` 身份写入一条聊天记录到镜像（尽力而为）
    pub async fn record_message(
        &self,
        customer_id: &str,
        message: NewChatMessage,
    ) -> Option<ChatMessageRecord> {
        let mirror = self.inner.mirror.as_ref()?;
        let session_id = message.session_id.clone();
        match self
            .bounded(mirror.append_message(customer_id, message), |ms| {
                MirrorError::Timeout(ms).into()
            })
            .await
        {
            Ok(record) => Some(record),
            Err(e) => {
                self.mirror_failed(&session_id, "append_message", &e).await;
                None
            }
        }
    }

    /// 从镜像读取该用户名下的对话记录；失败返回空
    pub async fn transcript(&self, key: &SessionKey) -> Vec<ChatMessageRecord> {
        let Some(mirror) = self.inner.mirror.as_ref() else {
            return Vec::new();
        };
        match self
            .bounded(mirror.list_messages(&key.session_id, &key.user_id), |ms| {
                MirrorError::Timeout(ms).into()
            })
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    session = %key,
                    error = %e,
                    "failed to read transcript from mirror"
                );
                Vec::new()
            }
        }
    }

    pub async fn mirror_health(&self) -> MirrorHealth {
        match self.inner.mirror.as_ref() {
            Some(mirror) => mirror.health().await,
            None => MirrorHealth::disabled(),
        }
    }

    /// 将会话归档到长期记忆（附带镜像中的对话记录）
    pub async fn add_session_to_memory(&self, key: &SessionKey) -> bool {
        let Some(session) = self.get_session(key).await else {
            debug!(target: LOG_TARGET, session = %key, "archive of absent session");
            return false;
        };
        let transcript = self.transcript(key).await;
        self.add_session_to_memory_with_transcript(&session, &transcript).await
    }

    /// 将给定会话快照与对话记录归档；失败只记录日志
    pub async fn add_session_to_memory_with_transcript(
        &self,
        session: &Session,
        transcript: &[ChatMessageRecord],
    ) -> bool {
        let Some(memory) = self.inner.memory.as_ref() else {
            return false;
        };

        let payload = build_archive_payload(session, transcript);
        match self
            .bounded(memory.add_session(payload), |ms| {
                MemoryIndexError::Timeout(ms).into()
            })
            .await
        {
            Ok(()) => {
                self.inner.stats.write().await.archived_total += 1;
                self.emit_event(StateEvent::SessionArchived {
                    key: session.key.clone(),
                    timestamp: Utc::now(),
                });
                info!(
                    target: LOG_TARGET,
                    session = %session.key,
                    index = memory.name(),
                    "added session to long-term memory"
                );
                true
            }
            Err(e) => {
                error!(
                    target: LOG_TARGET,
                    session = %session.key,
                    index = memory.name(),
                    error = %e,
                    "failed to add session to memory"
                );
                self.emit_event(StateEvent::MemoryIndexFailed {
                    key: session.key.clone(),
                    operation: "add_session",
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                false
            }
        }
    }

    /// 检索长期记忆；失败或未启用时返回空
    pub async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Vec<MemoryMatch> {
        let Some(memory) = self.inner.memory.as_ref() else {
            return Vec::new();
        };
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        let payload = MemorySearchPayload {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            limit,
        };
        match self
            .bounded(memory.search(payload), |ms| {
                MemoryIndexError::Timeout(ms).into()
            })
            .await
        {
            Ok(mut matches) => {
                matches.truncate(limit);
                matches
            }
            Err(e) => {
                error!(
                    target: LOG_TARGET,
                    app_name = %app_name,
                    user_id = %user_id,
                    index = memory.name(),
                    error = %e,
                    "failed to search memory"
                );
                Vec::new()
            }
        }
    }

    /// 清理空闲超时的会话，返回清理数量
    ///
    /// 只移除内存状态；镜像中的对话记录保留。
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let ttl = saturating_hours(self.inner.config.session_timeout_hours);
        let expired = self.inner.store.idle_keys(ttl, Utc::now()).await;
        let mut count = 0;
        for key in expired {
            // 收集与移除之间会话可能被更新过，移除时在会话锁内重新判断
            if self.inner.store.remove_if_idle(&key, ttl, Utc::now()).await {
                self.evicted(&key, EvictionReason::Expired).await;
                count += 1;
            }
        }
        if count > 0 {
            info!(target: LOG_TARGET, evicted = count, "cleaned up expired sessions");
        }
        count
    }

    /// 获取会话统计
    pub async fn stats(&self) -> SessionStats {
        let mut stats = self.inner.stats.read().await.clone();
        stats.active_sessions = self.inner.store.len().await;
        stats
    }

    fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<SessionManagerInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = SessionManager { inner };
                manager.cleanup_expired_sessions().await;
            }
        })
    }

    async fn enforce_user_limit(&self, app_name: &str, user_id: &str) {
        let max = self.inner.config.max_sessions_per_user;
        if max == 0 {
            return;
        }

        let mut activity = self.inner.store.scoped_activity(app_name, user_id).await;
        if activity.len() < max {
            return;
        }

        activity.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let overflow = activity.len() + 1 - max;
        for (key, _) in activity.into_iter().take(overflow) {
            self.evict(&key, EvictionReason::UserLimit).await;
        }
    }

    async fn evict(&self, key: &SessionKey, reason: EvictionReason) -> bool {
        if !self.inner.store.delete(key).await {
            return false;
        }
        self.evicted(key, reason).await;
        true
    }

    async fn evicted(&self, key: &SessionKey, reason: EvictionReason) {
        self.inner.stats.write().await.evicted_total += 1;
        self.emit_event(StateEvent::SessionEvicted {
            key: key.clone(),
            reason,
            timestamp: Utc::now(),
        });
        info!(target: LOG_TARGET, session = %key, reason = ?reason, "evicted session");
    }

    async fn delete_mirrored(&self, key: &SessionKey) {
        if let Some(mirror) = self.inner.mirror.as_ref() {
            let res = self
                .bounded(mirror.delete_session(&key.session_id, &key.user_id), |ms| {
                    MirrorError::Timeout(ms).into()
                })
                .await;
            if let Err(e) = res {
                self.mirror_failed(&key.session_id, "delete_session", &e).await;
            }
        }
    }

    async fn update_failed(&self, key: &SessionKey, e: &SessionError) {
        self.inner.stats.write().await.update_failures_total += 1;
        error!(
            target: LOG_TARGET,
            session = %key,
            error = %e,
            "failed to update session state"
        );
        self.emit_event(StateEvent::StateUpdateFailed {
            key: key.clone(),
            error: e.to_string(),
            timestamp: Utc::now(),
        });
    }

    async fn mirror_failed(&self, session_id: &str, operation: &'static str, e: &anyhow::Error) {
        self.inner.stats.write().await.mirror_failures_total += 1;
        warn!(
            target: LOG_TARGET,
            session_id = %session_id,
            operation = operation,
            error = %e,
            "durable mirror write failed"
        );
        self.emit_event(StateEvent::MirrorWriteFailed {
            session_id: session_id.to_string(),
            operation,
            error: e.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// 为副作用加超时
    async fn bounded<T, F, E>(&self, fut: F, on_timeout: E) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
        E: FnOnce(u64) -> anyhow::Error,
    {
        let ms = self.inner.config.side_effect_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(ms), fut).await {
            Ok(res) => res,
            Err(_) => Err(on_timeout(ms)),
        }
    }
}

/// 小时数转为时长，超出表示范围时取最大值
fn saturating_hours(hours: u64) -> ChronoDuration {
    i64::try_from(hours)
        .ok()
        .and_then(ChronoDuration::try_hours)
        .unwrap_or(ChronoDuration::MAX)
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::in_memory(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::event::string_list;
    use pretty_assertions::assert_eq;

    fn map(v: Value) -> StateMap {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_default_state_shape() {
        let manager = SessionManager::default();
        let session = manager
            .create_session("bank", "CUST001", Some("s1"), None)
            .await
            .unwrap();
        assert_eq!(session.state.get("customer_id"), Some(&json!("CUST001")));
        assert_eq!(session.state.get("user_preferences"), Some(&json!({})));
        assert_eq!(session.state.get(KEY_ACTIVE_OPERATIONS), Some(&json!([])));
        assert!(session.state.contains_key("conversation_start"));
        assert_eq!(
            session.state["context"]["preferred_language"],
            json!("en")
        );
    }

    #[tokio::test]
    async fn test_update_missing_session_is_soft_failure() {
        let manager = SessionManager::default();
        let mut rx = manager.subscribe();
        let key = SessionKey::new("bank", "u", "missing");
        assert!(manager
            .update_session_state(&key, map(json!({"a": 1})))
            .await
            .is_none());
        assert_eq!(manager.stats().await.update_failures_total, 1);
        match rx.recv().await {
            Ok(StateEvent::StateUpdateFailed { key: k, .. }) => assert_eq!(k, key),
            other => panic!("expected StateUpdateFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_existing() {
        let manager = SessionManager::default();
        let (first, created) = manager
            .get_or_create_session("bank", "u", Some("s"), None)
            .await
            .unwrap();
        assert!(created);
        manager
            .update_session_state(&first.key, map(json!({"k": "v"})))
            .await
            .unwrap();
        let (second, created) = manager
            .get_or_create_session("bank", "u", Some("s"), None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.state.get("k"), Some(&json!("v")));
    }

    #[tokio::test]
    async fn test_user_limit_evicts_least_recently_updated() {
        let config = SessionConfig {
            max_sessions_per_user: 2,
            ..SessionConfig::default()
        };
        let manager = SessionManager::in_memory(config);
        let a = manager
            .create_session("bank", "u", Some("a"), None)
            .await
            .unwrap();
        let b = manager
            .create_session("bank", "u", Some("b"), None)
            .await
            .unwrap();
        // a 更新后比 b 更新鲜
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager
            .update_session_state(&a.key, map(json!({"touched": true})))
            .await
            .unwrap();

        manager
            .create_session("bank", "u", Some("c"), None)
            .await
            .unwrap();
        assert!(manager.get_session(&b.key).await.is_none());
        assert_eq!(manager.list_sessions("bank", "u").await.len(), 2);
        assert_eq!(manager.stats().await.evicted_total, 1);

        // 其他用户不受影响
        manager
            .create_session("bank", "other", Some("a"), None)
            .await
            .unwrap();
        assert_eq!(manager.list_sessions("bank", "u").await.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let config = SessionConfig {
            session_timeout_hours: 0,
            ..SessionConfig::default()
        };
        let manager = SessionManager::in_memory(config);
        manager
            .create_session("bank", "u", Some("old"), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(manager.cleanup_expired_sessions().await, 1);
        assert!(manager.list_sessions("bank", "u").await.is_empty());
    }

    #[tokio::test]
    async fn test_huge_timeout_never_expires() {
        let config = SessionConfig {
            session_timeout_hours: u64::MAX,
            ..SessionConfig::default()
        };
        let manager = SessionManager::in_memory(config);
        manager
            .create_session("bank", "u", Some("s"), None)
            .await
            .unwrap();
        assert_eq!(manager.cleanup_expired_sessions().await, 0);
        assert_eq!(manager.list_sessions("bank", "u").await.len(), 1);
    }

    #[test]
    fn test_saturating_hours() {
        assert_eq!(saturating_hours(2), ChronoDuration::hours(2));
        assert_eq!(saturating_hours(u64::MAX), ChronoDuration::MAX);
        assert_eq!(saturating_hours(i64::MAX as u64), ChronoDuration::MAX);
    }

    #[tokio::test]
    async fn test_apply_known_delta() {
        let manager = SessionManager::default();
        let session = manager
            .create_session("bank", "u", Some("s"), None)
            .await
            .unwrap();
        let updated = manager
            .apply_known_delta(
                &session.key,
                "card_operations_agent",
                &KnownDelta::AddActiveOperation("card_blocked".into()),
            )
            .await
            .unwrap();
        assert_eq!(
            string_list(&updated.state, KEY_ACTIVE_OPERATIONS),
            vec!["card_blocked".to_string()]
        );
        assert_eq!(updated.events[0].author, "card_operations_agent");
    }

    #[tokio::test]
    async fn test_init_and_shutdown() {
        let manager = SessionManager::default();
        let mut rx = manager.subscribe();
        manager.init().await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Ok(StateEvent::ServiceStarted { .. })
        ));
        // 自检会话不应残留
        assert_eq!(manager.stats().await.active_sessions, 0);
        manager.shutdown().await;
        assert!(matches!(
            rx.recv().await,
            Ok(StateEvent::ServiceShutdown { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_memory_without_index_is_empty() {
        let manager = SessionManager::default();
        assert!(manager
            .search_memory("bank", "u", "loan", 5)
            .await
            .is_empty());
        let key = SessionKey::new("bank", "u", "none");
        assert!(!manager.add_session_to_memory(&key).await);
    }
}
