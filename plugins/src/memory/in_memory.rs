//! 进程内长期记忆索引
//!
//! 按 `(app, user)` 隔离，基于渲染后会话内容的关键词重合度召回。
//! 超出保留期的条目在每次写入时清理，读取时忽略。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use bankbot_core::memory::helpers::tokenize;
use bankbot_core::memory::{MemoryArchivePayload, MemoryIndex, MemoryMatch, MemorySearchPayload};

struct IndexedSession {
    session_id: String,
    content: String,
    terms: HashSet<String>,
    archived_at: DateTime<Utc>,
}

type Scope = (String, String);

pub struct InMemoryMemoryIndex {
    retention: Option<Duration>,
    entries: RwLock<HashMap<Scope, Vec<IndexedSession>>>,
}

impl InMemoryMemoryIndex {
    /// `retention_days == 0` 表示永久保留；超大值按最大时长处理
    pub fn new(retention_days: u64) -> Self {
        let retention = (retention_days > 0).then(|| {
            i64::try_from(retention_days)
                .ok()
                .and_then(Duration::try_days)
                .unwrap_or(Duration::MAX)
        });
        Self {
            retention,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn is_expired(&self, archived_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.retention.is_some_and(|r| now - archived_at > r)
    }

    /// 清理超出保留期的条目，返回清理数量
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for list in entries.values_mut() {
            let before = list.len();
            list.retain(|e| !self.is_expired(e.archived_at, now));
            removed += before - list.len();
        }
        entries.retain(|_, list| !list.is_empty());
        removed
    }
}

/// 查询词在条目中出现的比例
fn score(query_terms: &HashSet<String>, entry_terms: &HashSet<String>) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let hits = query_terms.intersection(entry_terms).count();
    hits as f32 / query_terms.len() as f32
}

#[async_trait]
impl MemoryIndex for InMemoryMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add_session(&self, payload: MemoryArchivePayload) -> Result<()> {
        let scope = (payload.app_name, payload.user_id);
        let entry = IndexedSession {
            terms: tokenize(&payload.content).into_iter().collect(),
            session_id: payload.session_id,
            content: payload.content,
            archived_at: payload.archived_at,
        };

        let pruned = self.prune(Utc::now()).await;
        if pruned > 0 {
            tracing::debug!(target: "bankbot.memory", pruned, "pruned expired memory entries");
        }

        let mut entries = self.entries.write().await;
        let list = entries.entry(scope).or_default();
        list.retain(|e| e.session_id != entry.session_id);
        list.push(entry);
        Ok(())
    }

    async fn search(&self, payload: MemorySearchPayload) -> Result<Vec<MemoryMatch>> {
        let query_terms: HashSet<String> = tokenize(&payload.query).into_iter().collect();
        if query_terms.is_empty() || payload.limit == 0 {
            return Ok(vec![]);
        }

        let now = Utc::now();
        let scope = (payload.app_name, payload.user_id);
        let entries = self.entries.read().await;
        let Some(list) = entries.get(&scope) else {
            return Ok(vec![]);
        };

        let mut out: Vec<MemoryMatch> = list
            .iter()
            .filter(|e| !self.is_expired(e.archived_at, now))
            .filter_map(|e| {
                let s = score(&query_terms, &e.terms);
                (s > 0.0).then(|| MemoryMatch {
                    session_id: e.session_id.clone(),
                    content: e.content.clone(),
                    score: s,
                    archived_at: Some(e.archived_at),
                    metadata: json!({ "index": "in_memory" }),
                })
            })
            .collect();

        out.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.archived_at.cmp(&a.archived_at))
        });
        out.truncate(payload.limit);
        Ok(out)
    }
}
