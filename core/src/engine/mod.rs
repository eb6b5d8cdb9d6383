mod post;
mod pre;
mod run;
mod types;

pub use pre::chat_initial_state;
pub use run::ChatEngine;
pub use types::{EngineConfig, SessionInfo, TurnInput, TurnOutput};
