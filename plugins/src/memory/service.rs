use anyhow::Result;
use async_trait::async_trait;
use bankbot_core::api as core_api;
use serde_json::Value;

use crate::http_client::JsonHttpClient;

const PATH_SESSIONS: &str = "/v1/memory/sessions";
const PATH_SEARCH: &str = "/v1/memory/search";

/// 由外部语义检索服务支撑的长期记忆
pub struct MemoryServiceIndex {
    client: JsonHttpClient,
}

impl MemoryServiceIndex {
    pub fn new(base_url: &str, api_key: String, timeout_ms: u64) -> Result<Self> {
        let client = JsonHttpClient::new("memory", base_url, api_key, timeout_ms)?;
        Ok(Self { client })
    }
}

/// 接受裸数组，或以 `matches`/`results` 包裹的对象
pub fn parse_memory_matches(raw: &Value) -> Result<Vec<core_api::MemoryMatch>> {
    let items = match raw {
        Value::Null => return Ok(vec![]),
        Value::Array(_) => raw.clone(),
        Value::Object(map) => match map.get("matches").or_else(|| map.get("results")) {
            Some(v @ Value::Array(_)) => v.clone(),
            _ => anyhow::bail!("memory search response has no matches array"),
        },
        other => anyhow::bail!("unexpected memory search response: {other}"),
    };
    Ok(serde_json::from_value(items)?)
}

#[async_trait]
impl core_api::MemoryIndex for MemoryServiceIndex {
    fn name(&self) -> &str {
        "memory_service"
    }

    async fn add_session(&self, payload: core_api::MemoryArchivePayload) -> Result<()> {
        tracing::debug!(
            target: "bankbot.memory",
            stage = "memory.service.add.in",
            app_name = %payload.app_name,
            user_id = %payload.user_id,
            session_id = %payload.session_id,
            content_len = payload.content.len(),
            transcript = payload.transcript.len()
        );
        self.client.post_no_content(PATH_SESSIONS, &payload).await?;
        tracing::debug!(target: "bankbot.memory", stage = "memory.service.add.out");
        Ok(())
    }

    async fn search(
        &self,
        payload: core_api::MemorySearchPayload,
    ) -> Result<Vec<core_api::MemoryMatch>> {
        tracing::debug!(
            target: "bankbot.memory",
            stage = "memory.service.search.in",
            app_name = %payload.app_name,
            user_id = %payload.user_id,
            query_len = payload.query.len(),
            limit = payload.limit
        );
        let raw = self.client.post_json(PATH_SEARCH, &payload).await?;
        let mut out = parse_memory_matches(&raw)?;
        out.truncate(payload.limit);
        tracing::debug!(
            target: "bankbot.memory",
            stage = "memory.service.search.out",
            matches = out.len()
        );
        Ok(out)
    }
}
