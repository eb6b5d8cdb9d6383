use anyhow::Result;
use std::sync::Arc;

use bankbot_core::api::{
    AppConfig, MemoryIndex, MemoryProvider, SessionManager, SessionMirror, TurnAgent,
};

use crate::agent::{HttpTurnAgent, OfflineTurnAgent};
use crate::memory::{InMemoryMemoryIndex, MemoryServiceIndex};
use crate::mirror::SqliteSessionMirror;

pub fn build_memory(cfg: &AppConfig) -> Result<Option<Arc<dyn MemoryIndex>>> {
    if !cfg.memory.enabled {
        return Ok(None);
    }

    match &cfg.memory.provider {
        MemoryProvider::InMemory => Ok(Some(Arc::new(InMemoryMemoryIndex::new(
            cfg.memory.retention_days,
        )))),
        MemoryProvider::Service(svc_cfg) => Ok(Some(Arc::new(MemoryServiceIndex::new(
            &svc_cfg.base_url,
            svc_cfg.api_key.clone(),
            svc_cfg.timeout_ms,
        )?))),
    }
}

pub async fn build_mirror(cfg: &AppConfig) -> Result<Option<Arc<dyn SessionMirror>>> {
    if !cfg.mirror.enabled {
        return Ok(None);
    }
    let mirror =
        SqliteSessionMirror::new(&cfg.mirror.database_url, cfg.mirror.max_connections).await?;
    Ok(Some(Arc::new(mirror)))
}

pub fn build_agent(cfg: &AppConfig) -> Result<Arc<dyn TurnAgent>> {
    if cfg.agent.base_url.trim().is_empty() {
        tracing::warn!(
            target: "bankbot.agent",
            "agent.base_url is empty; every turn will use the fallback response"
        );
        return Ok(Arc::new(OfflineTurnAgent));
    }
    Ok(Arc::new(HttpTurnAgent::new(
        &cfg.agent.base_url,
        cfg.agent.api_key.clone(),
        cfg.agent.timeout_ms,
        cfg.agent.model.clone(),
    )?))
}

pub async fn build_manager(cfg: &AppConfig) -> Result<SessionManager> {
    let mirror = build_mirror(cfg).await?;
    let memory = build_memory(cfg)?;
    Ok(SessionManager::new(cfg.session.clone(), mirror, memory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankbot_core::api::MemoryServiceConfig;

    #[tokio::test]
    async fn test_disabled_collaborators_are_absent() {
        let mut cfg = AppConfig::default();
        cfg.memory.enabled = false;
        cfg.mirror.enabled = false;

        assert!(build_memory(&cfg).unwrap().is_none());
        assert!(build_mirror(&cfg).await.unwrap().is_none());
        assert_eq!(build_agent(&cfg).unwrap().name(), "offline");
    }

    #[tokio::test]
    async fn test_configured_collaborators() {
        let mut cfg = AppConfig::default();
        cfg.mirror.database_url = "sqlite::memory:".to_string();
        cfg.memory.provider = MemoryProvider::Service(MemoryServiceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: String::new(),
            timeout_ms: 100,
        });
        cfg.agent.base_url = "http://127.0.0.1:9".to_string();

        assert_eq!(build_memory(&cfg).unwrap().unwrap().name(), "memory_service");
        assert_eq!(build_mirror(&cfg).await.unwrap().unwrap().name(), "sqlite");
        assert_eq!(build_agent(&cfg).unwrap().name(), "http_agent");

        let manager = build_manager(&cfg).await.unwrap();
        assert!(manager.mirror().is_some());
        assert!(manager.memory().is_some());
    }
}
