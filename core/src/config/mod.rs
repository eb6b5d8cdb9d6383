mod load;
mod types;

pub use load::{apply_env_overrides, get_bankbot_data_dir, load_default, load_from_file};
pub use types::{
    AgentConfig, AppConfig, HttpServerConfig, LoggingConfig, MemoryConfig, MemoryProvider,
    MemoryServiceConfig, MirrorConfig, SessionConfig,
};
