use async_trait::async_trait;

use crate::agent::types::{AgentReply, AgentRequest};

/// 回答一轮对话的外部 LLM/工具运行时
#[async_trait]
pub trait TurnAgent: Send + Sync {
    fn name(&self) -> &str;
    async fn run_turn(&self, request: AgentRequest) -> anyhow::Result<AgentReply>;
}
