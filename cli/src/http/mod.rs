//! HTTP服务器模块 - 暴露对话与会话管理API

pub mod auth;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod validation;

pub use models::*;
pub use server::*;
pub use state::*;
