//! 引擎 post-turn：应用 agent 上报的状态增量、记录本轮结果、写入助手消息。
use crate::mirror::NewChatMessage;
use crate::state::{
    AppendOutcome, KnownDelta, Session, SessionManager, StateDelta, StateUpdateEvent,
    SYSTEM_AUTHOR,
};

pub(crate) struct PostTurnContext<'a> {
    pub manager: &'a SessionManager,
    pub session: Session,
    pub agent_name: &'a str,
    pub response: &'a str,
}

/// 返回本轮结束后的会话快照
pub(crate) async fn post_turn(ctx: PostTurnContext<'_>, deltas: Vec<StateDelta>) -> Session {
    let PostTurnContext {
        manager,
        mut session,
        agent_name,
        response,
    } = ctx;
    let key = session.key.clone();

    for delta in deltas.into_iter().filter(|d| !d.is_empty()) {
        let event = StateUpdateEvent::new(agent_name, delta);
        match manager.append_event(&key, event).await {
            Ok((AppendOutcome::Applied, updated)) => session = updated,
            Ok((AppendOutcome::Duplicate, _)) => {}
            Err(e) => {
                tracing::warn!(
                    target: "bankbot.engine",
                    session = %key,
                    agent = agent_name,
                    error = %e,
                    "dropping agent state delta"
                );
            }
        }
    }

    let completed = KnownDelta::TurnCompleted {
        agent_name: agent_name.to_string(),
    };
    if let Some(updated) = manager
        .apply_known_delta(&key, SYSTEM_AUTHOR, &completed)
        .await
    {
        session = updated;
    }

    manager
        .record_message(
            &key.user_id,
            NewChatMessage::assistant(key.session_id.as_str(), response, agent_name),
        )
        .await;

    session
}
