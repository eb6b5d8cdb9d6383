use crate::state::{string_list, StateMap};

use super::types::AgentKind;

pub const MAX_SUGGESTIONS: usize = 4;

pub const FALLBACK_RESPONSE: &str = "I apologize, but I'm having trouble processing your request right now. Please try again or contact our customer service at (995 32) 2272727.";

fn base_suggestions(agent: AgentKind) -> &'static [&'static str] {
    match agent {
        AgentKind::Coordinator => &[
            "Check my card balance",
            "Block my card",
            "What loan options do you have?",
            "Contact customer service",
        ],
        AgentKind::CardOperations => &[
            "Show my recent transactions",
            "What are the spending limits?",
            "How to enable notifications?",
            "Unblock my card",
        ],
        AgentKind::Loan => &[
            "Calculate monthly payments",
            "What documents do I need?",
            "Compare loan options",
            "Check my eligibility",
        ],
        AgentKind::Support => &[
            "Find nearest branch",
            "Mobile banking features",
            "Fee information",
            "Open new account",
        ],
    }
}

/// 按回答的 agent 生成后续建议，并根据会话中进行中的操作调整
pub fn generate_suggestions(agent_name: &str, state: &StateMap) -> Vec<String> {
    let agent = AgentKind::resolve(Some(agent_name));
    let mut out: Vec<String> = base_suggestions(agent)
        .iter()
        .map(|s| s.to_string())
        .collect();

    let ops = string_list(state, crate::state::event::KEY_ACTIVE_OPERATIONS);
    if ops.iter().any(|op| op == "card_blocked") {
        out.insert(0, "Unblock my card".to_string());
    }
    if ops.iter().any(|op| op == "recent_transfer") {
        out.insert(0, "Check transfer status".to_string());
    }

    out.truncate(MAX_SUGGESTIONS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state(v: serde_json::Value) -> StateMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_base_list_per_agent() {
        let s = generate_suggestions("loan_agent", &StateMap::new());
        assert_eq!(
            s,
            vec![
                "Calculate monthly payments",
                "What documents do I need?",
                "Compare loan options",
                "Check my eligibility",
            ]
        );
    }

    #[test]
    fn test_unknown_agent_uses_coordinator_list() {
        let s = generate_suggestions("mystery_agent", &StateMap::new());
        assert_eq!(s[0], "Check my card balance");
        assert_eq!(s.len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn test_active_operations_are_prepended() {
        let st = state(json!({"active_operations": ["card_blocked", "recent_transfer"]}));
        let s = generate_suggestions("coordinator", &st);
        assert_eq!(
            s,
            vec![
                "Check transfer status",
                "Unblock my card",
                "Check my card balance",
                "Block my card",
            ]
        );
    }

    #[test]
    fn test_card_blocked_on_card_agent_keeps_four() {
        let st = state(json!({"active_operations": ["card_blocked"]}));
        let s = generate_suggestions("card_operations_agent", &st);
        assert_eq!(s.len(), 4);
        assert_eq!(s[0], "Unblock my card");
    }
}
