//! 面向使用方（`cli`、`plugins` 及外部 crate）的稳定导出
//!
//! 优先从 `bankbot_core::api` 导入，而不是直接引用内部模块。

pub use crate::agent::{
    generate_suggestions, AgentKind, AgentReply, AgentRequest, TurnAgent, FALLBACK_RESPONSE,
};
pub use crate::config::{
    load_default, load_from_file, AgentConfig, AppConfig, HttpServerConfig, LoggingConfig,
    MemoryConfig, MemoryProvider, MemoryServiceConfig, MirrorConfig, SessionConfig,
};
pub use crate::context::{AppContext, Services, ServicesFactory};
pub use crate::engine::{ChatEngine, EngineConfig, SessionInfo, TurnInput, TurnOutput};
pub use crate::error::{AgentError, CliError, MemoryIndexError, MirrorError, SessionError};
pub use crate::memory::{
    MemoryArchivePayload, MemoryIndex, MemoryMatch, MemorySearchPayload, TranscriptLine,
};
pub use crate::mirror::{
    ChatMessageRecord, ChatRole, MirrorHealth, NewChatMessage, SessionMirror, SessionRecord,
};
pub use crate::state::{
    AppendOutcome, EvictionReason, KnownDelta, Session, SessionKey, SessionManager, SessionStats,
    StateDelta, StateEvent, StateMap, StateUpdateEvent,
};
