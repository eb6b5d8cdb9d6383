//! # 会话状态模块
//!
//! 负责聊天会话的短期状态：内存状态表、事件追加协议与生命周期管理。
//!
//! ## 设计原则
//!
//! 1. **内存优先**：内存状态表是运行期间唯一的权威来源
//! 2. **只追加**：所有状态变更都以 `StateUpdateEvent` 记录，可重放
//! 3. **单会话串行**：同一会话的读-改-写在会话锁内完成
//! 4. **副作用隔离**：镜像与长期记忆失败不影响会话本身

pub mod event;
pub mod manager;
pub mod session;
pub mod store;
pub mod types;

pub use event::{
    apply_delta, replay, string_list, KnownDelta, StateDelta, StateUpdateEvent, SYSTEM_AUTHOR,
};
pub use manager::SessionManager;
pub use session::Session;
pub use store::StateStore;
pub use types::{AppendOutcome, EvictionReason, SessionKey, SessionStats, StateEvent, StateMap};
