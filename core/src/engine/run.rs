//! 引擎主入口：把一次用户消息编排为 pre-turn（会话/记忆）→ agent 执行 → post-turn（状态/消息/建议）。
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{
    generate_suggestions, AgentKind, AgentReply, AgentRequest, TurnAgent, FALLBACK_RESPONSE,
};
use crate::context::Services;
use crate::error::{AgentError, SessionError};
use crate::mirror::{ChatRole, NewChatMessage};
use crate::state::{SessionKey, SessionManager};

use super::post::{post_turn, PostTurnContext};
use super::pre::pre_turn;
use super::types::{EngineConfig, SessionInfo, TurnInput, TurnOutput};

const LOG_TARGET: &str = "bankbot.engine";

/// 对话轮次引擎
#[derive(Clone)]
pub struct ChatEngine {
    manager: SessionManager,
    agent: Arc<dyn TurnAgent>,
    cfg: EngineConfig,
}

impl ChatEngine {
    pub fn new(manager: SessionManager, agent: Arc<dyn TurnAgent>, cfg: EngineConfig) -> Self {
        Self {
            manager,
            agent,
            cfg,
        }
    }

    pub fn from_services(services: &Services, cfg: EngineConfig) -> Self {
        Self::new(services.manager.clone(), services.agent.clone(), cfg)
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// 处理一轮对话
    ///
    /// 只有输入非法时返回错误；会话、记忆、agent 的故障都降级为日志与兜底回复。
    pub async fn handle_turn(&self, input: TurnInput) -> Result<TurnOutput, SessionError> {
        if input.message.trim().is_empty() {
            return Err(SessionError::Invalid("message must not be empty".to_string()));
        }

        let pre = pre_turn(&self.manager, &self.cfg, &input).await?;
        let session_id = pre.session.id().to_string();
        let agent = AgentKind::resolve(input.preferred_agent.as_deref());

        tracing::info!(
            target: LOG_TARGET,
            session_id = %session_id,
            user_id = %input.user_id,
            agent = agent.agent_name(),
            created = pre.created,
            recalled = pre.recalled.len(),
            "handling chat turn"
        );
        if self.cfg.chat_logging {
            tracing::debug!(target: LOG_TARGET, session_id = %session_id, message = %input.message, "user message");
        }

        let request = AgentRequest {
            app_name: input.app_name.clone(),
            user_id: input.user_id.clone(),
            session_id: session_id.clone(),
            agent,
            message: input.message.clone(),
            state: pre.session.state.clone(),
            recalled_context: pre.recalled_context,
            recalled: pre.recalled,
        };

        let reply = match self.call_agent(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    target: LOG_TARGET,
                    session_id = %session_id,
                    agent = agent.agent_name(),
                    error = %e,
                    "agent turn failed, returning fallback"
                );
                self.manager
                    .record_message(
                        &input.user_id,
                        NewChatMessage::assistant(
                            session_id.as_str(),
                            FALLBACK_RESPONSE,
                            agent.agent_name(),
                        ),
                    )
                    .await;
                let state = pre.session.state;
                return Ok(TurnOutput {
                    response: FALLBACK_RESPONSE.to_string(),
                    session_id,
                    agent_name: agent.agent_name().to_string(),
                    suggestions: generate_suggestions(agent.agent_name(), &state),
                    session_state: state,
                    fallback: true,
                });
            }
        };

        let agent_name = reply
            .agent_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| agent.agent_name().to_string());

        let session = post_turn(
            PostTurnContext {
                manager: &self.manager,
                session: pre.session,
                agent_name: &agent_name,
                response: &reply.text,
            },
            reply.state_deltas,
        )
        .await;

        if self.cfg.chat_logging {
            tracing::debug!(target: LOG_TARGET, session_id = %session_id, agent = %agent_name, response = %reply.text, "assistant message");
        }

        Ok(TurnOutput {
            suggestions: generate_suggestions(&agent_name, &session.state),
            response: reply.text,
            session_id,
            agent_name,
            session_state: session.state,
            fallback: false,
        })
    }

    async fn call_agent(&self, request: AgentRequest) -> Result<AgentReply, AgentError> {
        let ms = self.cfg.agent_timeout_ms;
        let reply = match tokio::time::timeout(Duration::from_millis(ms), self.agent.run_turn(request)).await
        {
            Ok(res) => res?,
            Err(_) => return Err(AgentError::Timeout(ms)),
        };
        if reply.text.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        Ok(reply)
    }

    /// 会话详情：状态、对话记录与统计
    pub async fn session_info(&self, key: &SessionKey) -> Option<SessionInfo> {
        let session = self.manager.get_session(key).await?;
        let messages = self.manager.transcript(&session.key).await;
        let operations_count = messages
            .iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .filter(|m| m.agent_name.as_deref() != Some(AgentKind::Coordinator.agent_name()))
            .count();

        Some(SessionInfo {
            session_id: session.key.session_id.clone(),
            customer_id: session.key.user_id.clone(),
            created_at: session.created_at,
            last_update_time: session.last_update_time,
            events_count: session.events.len(),
            state: session.state,
            messages,
            operations_count,
        })
    }

    /// 归档到长期记忆
    pub async fn archive_session(&self, key: &SessionKey) -> bool {
        self.manager.add_session_to_memory(key).await
    }
}
