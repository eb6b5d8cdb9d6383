pub mod suggestions;
pub mod r#trait;
pub mod types;

pub use r#trait::TurnAgent;
pub use suggestions::{generate_suggestions, FALLBACK_RESPONSE, MAX_SUGGESTIONS};
pub use types::{AgentKind, AgentReply, AgentRequest};
