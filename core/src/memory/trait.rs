use crate::memory::models::{MemoryArchivePayload, MemoryMatch, MemorySearchPayload};
use async_trait::async_trait;

/// 已归档会话的长期记忆索引，按 (app, user) 隔离
#[async_trait]
pub trait MemoryIndex: Send + Sync {
    fn name(&self) -> &str;
    /// 写入一个会话；同一 session id 重复归档时替换旧条目
    async fn add_session(&self, payload: MemoryArchivePayload) -> anyhow::Result<()>;
    async fn search(&self, payload: MemorySearchPayload) -> anyhow::Result<Vec<MemoryMatch>>;
}
