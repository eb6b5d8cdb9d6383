#[allow(clippy::module_inception)]
pub mod error;

pub use error::{AgentError, CliError, MemoryIndexError, MirrorError, SessionError};
