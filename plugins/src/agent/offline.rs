use anyhow::Result;
use async_trait::async_trait;
use bankbot_core::api::{AgentReply, AgentRequest, TurnAgent};

/// 未配置 agent 服务时的占位实现
///
/// 每轮都返回错误，由引擎回复兜底文本；会话本身照常工作。
#[derive(Debug, Default)]
pub struct OfflineTurnAgent;

#[async_trait]
impl TurnAgent for OfflineTurnAgent {
    fn name(&self) -> &str {
        "offline"
    }

    async fn run_turn(&self, request: AgentRequest) -> Result<AgentReply> {
        tracing::debug!(
            target: "bankbot.agent",
            stage = "agent.offline",
            agent = request.agent.as_str(),
            session_id = %request.session_id
        );
        anyhow::bail!("agent service not configured (agent.base_url is empty)")
    }
}
