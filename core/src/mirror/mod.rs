//! 持久化镜像：与内存会话状态并行保存的关系型记录，用于审计与重建对话记录。
//! 从不作为实时状态的权威来源。

pub mod models;
pub mod r#trait;

pub use models::{ChatMessageRecord, ChatRole, MirrorHealth, NewChatMessage, SessionRecord};
pub use r#trait::SessionMirror;
