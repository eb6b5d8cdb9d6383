//! ServicesFactory 实现：从配置构建会话管理器（镜像 + 记忆索引）与 agent，供 CLI 复用。
use async_trait::async_trait;
use bankbot_core::api::{AppConfig, CliError, Services, ServicesFactory};

use crate::factory;

#[derive(Default)]
pub struct PluginServicesFactory;

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, CliError> {
        let manager = factory::build_manager(cfg).await?;
        let agent = factory::build_agent(cfg)?;
        Ok(Services { manager, agent })
    }
}
