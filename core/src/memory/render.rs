use chrono::Utc;
use serde_json::Value;

use super::helpers::{one_line, truncate_clean};
use super::models::{MemoryArchivePayload, MemoryMatch, TranscriptLine};
use crate::mirror::ChatMessageRecord;
use crate::state::Session;

/// 对召回无价值的状态键
const SKIPPED_STATE_KEYS: &[&str] = &["conversation_start", "conversation_history"];

pub fn render_session_content(session: &Session, transcript: &[TranscriptLine]) -> String {
    let mut out = String::new();
    out.push_str(&format!("session {} (user {})\n", session.id(), session.user_id()));

    for (k, v) in &session.state {
        if SKIPPED_STATE_KEYS.contains(&k.as_str()) {
            continue;
        }
        let rendered = match v {
            Value::String(s) => s.clone(),
            Value::Null => continue,
            other => other.to_string(),
        };
        out.push_str(&format!("{k}: {}\n", one_line(&rendered)));
    }

    for line in transcript {
        match &line.agent_name {
            Some(agent) => out.push_str(&format!(
                "{} ({agent}): {}\n",
                line.role,
                one_line(&line.content)
            )),
            None => out.push_str(&format!("{}: {}\n", line.role, one_line(&line.content))),
        }
    }

    out
}

pub fn build_archive_payload(
    session: &Session,
    transcript: &[ChatMessageRecord],
) -> MemoryArchivePayload {
    let lines: Vec<TranscriptLine> = transcript
        .iter()
        .map(|m| TranscriptLine {
            role: m.role.to_string(),
            content: m.content.clone(),
            agent_name: m.agent_name.clone(),
        })
        .collect();

    MemoryArchivePayload {
        app_name: session.key.app_name.clone(),
        user_id: session.key.user_id.clone(),
        session_id: session.key.session_id.clone(),
        content: render_session_content(session, &lines),
        state: Value::Object(session.state.clone()),
        transcript: lines,
        archived_at: Utc::now(),
    }
}

/// 把召回条目渲染为交给 agent 的上下文块
pub fn render_recall_context(items: &[MemoryMatch], max_items: usize, max_chars: usize) -> String {
    if items.is_empty() || max_items == 0 {
        return String::new();
    }

    let mut out = String::new();
    out.push_str("[PAST_CONVERSATIONS]\n");
    for (idx, it) in items.iter().take(max_items).enumerate() {
        out.push_str(&format!(
            "{}) session={} score={:.2}\n{}\n",
            idx + 1,
            it.session_id,
            it.score,
            truncate_clean(&it.content, max_chars)
        ));
    }
    out.push_str("[/PAST_CONVERSATIONS]\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::ChatRole;
    use crate::state::SessionKey;
    use serde_json::json;

    fn session() -> Session {
        let state = json!({
            "customer_id": "CUST001",
            "conversation_start": "2024-01-01T00:00:00Z",
            "active_operations": ["card_blocked"],
            "nothing": null
        });
        Session::new(
            SessionKey::new("bank", "CUST001", "s1"),
            state.as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn test_archive_payload_includes_state_and_transcript() {
        let transcript = vec![ChatMessageRecord {
            id: 1,
            session_id: "s1".into(),
            role: ChatRole::Assistant,
            content: "Your card   is blocked.".into(),
            agent_name: Some("card_operations_agent".into()),
            created_at: Utc::now(),
        }];
        let payload = build_archive_payload(&session(), &transcript);
        assert_eq!(payload.session_id, "s1");
        assert!(payload.content.contains("active_operations: [\"card_blocked\"]"));
        assert!(payload
            .content
            .contains("assistant (card_operations_agent): Your card is blocked."));
        assert!(!payload.content.contains("conversation_start"));
        assert!(!payload.content.contains("nothing"));
        assert_eq!(payload.transcript.len(), 1);
    }

    #[test]
    fn test_render_recall_context() {
        assert!(render_recall_context(&[], 3, 100).is_empty());
        let items = vec![MemoryMatch {
            session_id: "old".into(),
            content: "loan question".into(),
            score: 0.5,
            archived_at: None,
            metadata: Value::Null,
        }];
        let out = render_recall_context(&items, 3, 100);
        assert!(out.starts_with("[PAST_CONVERSATIONS]"));
        assert!(out.contains("session=old score=0.50"));
    }
}
