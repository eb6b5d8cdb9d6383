use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: app={app_name} user={user_id} session={session_id}")]
    NotFound {
        app_name: String,
        user_id: String,
        session_id: String,
    },
    #[error("session already exists: app={app_name} user={user_id} session={session_id}")]
    Conflict {
        app_name: String,
        user_id: String,
        session_id: String,
    },
    #[error("invalid session request: {0}")]
    Invalid(String),
}

impl SessionError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("mirror connection error: {0}")]
    Connection(String),
    #[error("mirror migration failed: {0}")]
    Migration(String),
    #[error("mirror query failed: {0}")]
    Query(String),
    #[error("session {0} is owned by another customer")]
    ForeignOwner(String),
    #[error("mirror write timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum MemoryIndexError {
    #[error("memory index disabled")]
    Disabled,
    #[error("memory index timed out after {0}ms")]
    Timeout(u64),
    #[error("memory index backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent timed out after {0}ms")]
    Timeout(u64),
    #[error("agent returned an empty response")]
    EmptyResponse,
    #[error("agent upstream error: {0}")]
    Upstream(#[from] anyhow::Error),
}
