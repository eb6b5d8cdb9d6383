//! bankbot-core：银行客服后端的会话状态、状态更新协议、长期记忆与对话轮次边界

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod memory;
pub mod mirror;
pub mod state;
