use crate::mirror::models::{ChatMessageRecord, MirrorHealth, NewChatMessage, SessionRecord};
use async_trait::async_trait;

/// 持久化镜像
///
/// 会话记录归首次写入它的客户所有；除 `get_session` 外，所有操作都按 `customer_id` 限定范围。
#[async_trait]
pub trait SessionMirror: Send + Sync {
    fn name(&self) -> &str;
    /// 写入或刷新 `{session_id, customer_id}` 记录；已归属其他客户时返回错误
    async fn record_session(&self, session_id: &str, customer_id: &str) -> anyhow::Result<()>;
    async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>>;
    /// 删除该客户名下的会话记录及消息；不存在不是错误
    async fn delete_session(&self, session_id: &str, customer_id: &str) -> anyhow::Result<bool>;
    /// 追加消息；会话已归属其他客户时返回错误
    async fn append_message(
        &self,
        customer_id: &str,
        message: NewChatMessage,
    ) -> anyhow::Result<ChatMessageRecord>;
    /// 该客户名下的消息，按 `created_at` 升序
    async fn list_messages(
        &self,
        session_id: &str,
        customer_id: &str,
    ) -> anyhow::Result<Vec<ChatMessageRecord>>;
    async fn health(&self) -> MirrorHealth;
}
