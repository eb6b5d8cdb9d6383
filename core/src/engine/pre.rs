//! 引擎 pre-turn：解析或创建会话、记录用户消息、检索长期记忆。
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::SessionError;
use crate::memory::{render_recall_context, MemoryMatch};
use crate::mirror::NewChatMessage;
use crate::state::event::{KEY_ACTIVE_OPERATIONS, KEY_AGENT_SWITCHES, KEY_CONVERSATION_HISTORY};
use crate::state::{Session, SessionManager, StateMap};

use super::types::{EngineConfig, TurnInput};

pub(crate) struct PreTurn {
    pub session: Session,
    pub created: bool,
    pub recalled: Vec<MemoryMatch>,
    pub recalled_context: String,
}

/// 对话会话的初始状态（比管理器默认状态多出对话相关字段）
pub fn chat_initial_state(user_id: &str, context: Option<&Value>, preferred_language: &str) -> StateMap {
    let state = json!({
        "customer_id": user_id,
        "conversation_start": Utc::now().to_rfc3339(),
        "context": context.cloned().unwrap_or_else(|| json!({})),
        "preferred_language": preferred_language,
        "banking_context": true,
        "user_preferences": {},
        KEY_ACTIVE_OPERATIONS: [],
        KEY_CONVERSATION_HISTORY: [],
        KEY_AGENT_SWITCHES: 0
    });
    match state {
        Value::Object(map) => map,
        _ => StateMap::new(),
    }
}

pub(crate) async fn pre_turn(
    manager: &SessionManager,
    cfg: &EngineConfig,
    input: &TurnInput,
) -> Result<PreTurn, SessionError> {
    let initial = chat_initial_state(&input.user_id, input.context.as_ref(), &cfg.preferred_language);
    let (session, created) = manager
        .get_or_create_session(
            &input.app_name,
            &input.user_id,
            input.session_id.as_deref(),
            Some(initial),
        )
        .await?;

    manager
        .record_message(
            &input.user_id,
            NewChatMessage::user(session.id(), input.message.as_str()),
        )
        .await;

    if !cfg.memory_enabled || cfg.recall_limit == 0 {
        return Ok(PreTurn {
            session,
            created,
            recalled: vec![],
            recalled_context: String::new(),
        });
    }

    let recalled: Vec<MemoryMatch> = manager
        .search_memory(
            &input.app_name,
            &input.user_id,
            &input.message,
            cfg.recall_limit,
        )
        .await
        .into_iter()
        .filter(|m| m.session_id != session.id())
        .collect();

    if !recalled.is_empty() {
        tracing::debug!(
            target: "bankbot.engine",
            session_id = %session.id(),
            matches = recalled.len(),
            "recalled past conversations"
        );
    }

    let recalled_context = render_recall_context(&recalled, cfg.recall_limit, cfg.recall_max_chars);
    Ok(PreTurn {
        session,
        created,
        recalled,
        recalled_context,
    })
}
