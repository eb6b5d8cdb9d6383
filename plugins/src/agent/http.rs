use anyhow::Result;
use async_trait::async_trait;
use bankbot_core::api::{AgentReply, AgentRequest, StateDelta, TurnAgent};
use serde::Serialize;
use serde_json::Value;

use crate::http_client::JsonHttpClient;

/// 通过 HTTP 调用外部 agent 运行时执行一轮对话
///
/// 请求以 JSON 发往 `POST {base}/v1/agents/{agent}/run`。
pub struct HttpTurnAgent {
    client: JsonHttpClient,
    model: String,
}

#[derive(Serialize)]
struct RunPayload<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a AgentRequest,
}

impl HttpTurnAgent {
    pub fn new(base_url: &str, api_key: String, timeout_ms: u64, model: String) -> Result<Self> {
        let client = JsonHttpClient::new("agent", base_url, api_key, timeout_ms)?;
        Ok(Self { client, model })
    }
}

#[async_trait]
impl TurnAgent for HttpTurnAgent {
    fn name(&self) -> &str {
        "http_agent"
    }

    async fn run_turn(&self, request: AgentRequest) -> Result<AgentReply> {
        let path = format!("/v1/agents/{}/run", request.agent.as_str());
        tracing::debug!(
            target: "bankbot.agent",
            stage = "agent.http.run.in",
            agent = request.agent.as_str(),
            session_id = %request.session_id,
            message_len = request.message.len(),
            recalled = request.recalled.len()
        );

        let payload = RunPayload {
            model: &self.model,
            request: &request,
        };
        let raw = self.client.post_json(&path, &payload).await?;
        let reply = parse_agent_reply(&raw)?;

        tracing::debug!(
            target: "bankbot.agent",
            stage = "agent.http.run.out",
            agent_name = ?reply.agent_name,
            text_len = reply.text.len(),
            deltas = reply.state_deltas.len()
        );
        Ok(reply)
    }
}

/// 结构化回复带 `text` 字段；否则回退到常见的文本字段
pub fn parse_agent_reply(v: &Value) -> Result<AgentReply> {
    if v.get("text").is_some_and(Value::is_string) {
        let reply: AgentReply = serde_json::from_value(v.clone())?;
        return Ok(reply);
    }

    let text = extract_textish(v)
        .ok_or_else(|| anyhow::anyhow!("agent response has no text field"))?;
    let agent_name = v
        .get("agent_name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let state_deltas = match v.get("state_delta") {
        Some(Value::Object(map)) => vec![StateDelta::from(map.clone())],
        _ => vec![],
    };
    Ok(AgentReply {
        text,
        agent_name,
        state_deltas,
    })
}

fn extract_textish(v: &Value) -> Option<String> {
    if let Some(s) = v.get("response").and_then(|x| x.as_str()) {
        return Some(s.to_string());
    }
    // 类 OpenAI 格式：{ choices: [ { message: { content: "..." } } ] }
    if let Some(s) = v
        .get("choices")
        .and_then(|x| x.get(0))
        .and_then(|x| x.get("message"))
        .and_then(|x| x.get("content"))
        .and_then(|x| x.as_str())
    {
        return Some(s.to_string());
    }
    v.as_str().map(str::to_string)
}
