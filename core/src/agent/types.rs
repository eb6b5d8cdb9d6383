use serde::{Deserialize, Serialize};
use std::fmt;

use crate::memory::MemoryMatch;
use crate::state::{StateDelta, StateMap};

/// 一轮对话可路由到的专职 agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Coordinator,
    CardOperations,
    Loan,
    Support,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Coordinator,
        AgentKind::CardOperations,
        AgentKind::Loan,
        AgentKind::Support,
    ];

    /// 路由键，用于 URL 路径与请求
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::CardOperations => "card_operations",
            Self::Loan => "loan",
            Self::Support => "support",
        }
    }

    /// 记录在对话记录与状态事件上的名称
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::CardOperations => "card_operations_agent",
            Self::Loan => "loan_agent",
            Self::Support => "support_agent",
        }
    }

    /// 接受路由键或 agent 名称
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.agent_name() == s)
    }

    /// 未知或缺省的名称解析为 coordinator
    pub fn resolve(preferred: Option<&str>) -> Self {
        preferred.and_then(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub agent: AgentKind,
    pub message: String,
    pub state: StateMap,
    /// 渲染后的 `[PAST_CONVERSATIONS]` 块；无召回时为空
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recalled_context: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recalled: Vec<MemoryMatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(default)]
    pub text: String,
    /// 实际产生回复的 agent；coordinator 可能转交
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// 本轮工具上报的状态增量，按调用顺序
    #[serde(default)]
    pub state_deltas: Vec<StateDelta>,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.state_deltas.push(delta);
        self
    }
}
