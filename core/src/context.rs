use crate::agent::TurnAgent;
use crate::config::AppConfig;
use crate::engine::{ChatEngine, EngineConfig};
use crate::error::CliError;
use crate::state::SessionManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub manager: SessionManager,
    pub agent: Arc<dyn TurnAgent>,
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, CliError>;
}

#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    services_factory: Option<Arc<dyn ServicesFactory>>,
}

impl AppContext {
    pub fn new(cfg: AppConfig, services_factory: Option<Arc<dyn ServicesFactory>>) -> Self {
        Self {
            cfg,
            services_factory,
        }
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn with_config(&self, cfg: AppConfig) -> Self {
        Self {
            cfg,
            services_factory: self.services_factory.clone(),
        }
    }

    pub async fn build_services(&self) -> Result<Services, CliError> {
        let Some(factory) = self.services_factory.as_ref() else {
            return Err(CliError::Config(
                "services_factory missing (cannot build plugins/services)".into(),
            ));
        };
        factory.build_services(&self.cfg).await
    }

    /// 构建服务、执行会话自检并启动后台任务
    pub async fn start(&self) -> Result<(Services, ChatEngine), CliError> {
        let services = self.build_services().await?;
        services
            .manager
            .init()
            .await
            .map_err(|e| CliError::Server(format!("session service self-check failed: {e}")))?;
        let engine = ChatEngine::from_services(&services, EngineConfig::from_app_config(&self.cfg));
        Ok((services, engine))
    }
}
