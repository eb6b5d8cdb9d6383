use std::path::{Path, PathBuf};

use super::types::{AppConfig, MemoryProvider, MemoryServiceConfig};

/// 默认数据目录：~/.bankbot
pub fn get_bankbot_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".bankbot"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // 优先级 1：~/.bankbot/config.toml（最高）
    let data_dir = get_bankbot_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // 优先级 2：./config.toml（当前目录）
    let local_config = Path::new("config.toml");

    let mut cfg = if home_config.exists() {
        load_from_file(&home_config)?
    } else if local_config.exists() {
        load_from_file(local_config)?
    } else {
        AppConfig::default()
    };

    // 开启文件日志时，日志目录默认为数据目录
    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    // 环境变量覆盖（优先级 0：最高）
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

    Ok(cfg)
}

pub fn load_from_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// 应用 `BANKBOT_*` 覆盖；`lookup` 抽象环境变量读取，便于测试
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("BANKBOT_DATABASE_URL") {
        cfg.mirror.database_url = v;
    }
    if let Some(v) = get("BANKBOT_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = get("BANKBOT_AGENT_URL") {
        cfg.agent.base_url = v;
    }
    if let Some(v) = get("BANKBOT_AGENT_API_KEY") {
        cfg.agent.api_key = v;
    }
    if let Some(v) = get("ENABLE_MEMORY_PERSISTENCE") {
        cfg.memory.enabled = v.eq_ignore_ascii_case("true");
    }

    if let Some(url) = get("BANKBOT_MEMORY_URL") {
        match cfg.memory.provider {
            MemoryProvider::Service(ref mut svc) => svc.base_url = url,
            MemoryProvider::InMemory => {
                cfg.memory.provider = MemoryProvider::Service(MemoryServiceConfig {
                    base_url: url,
                    api_key: String::new(),
                    timeout_ms: 10_000,
                });
            }
        }
    }
    if let Some(key) = get("BANKBOT_MEMORY_API_KEY") {
        if let MemoryProvider::Service(ref mut svc) = cfg.memory.provider {
            svc.api_key = key;
        }
    }
}
