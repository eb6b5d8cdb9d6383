pub mod agent;
pub mod factory;
pub mod http_client;
pub mod memory;
pub mod mirror;
pub mod services;
