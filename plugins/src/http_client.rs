use serde::Serialize;
use serde_json::Value;
use std::{error::Error as StdError, fmt};

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceHttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Unknown,
}

impl ServiceHttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调用外部 JSON 服务（记忆服务或 agent 运行时）的失败
#[derive(Debug)]
pub struct ServiceHttpError {
    service: &'static str,
    kind: ServiceHttpErrorKind,
    status: Option<u16>,
    url: Option<String>,
    message: String,
    source: Option<anyhow::Error>,
}

impl ServiceHttpError {
    pub fn kind(&self) -> ServiceHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    fn from_reqwest(service: &'static str, err: reqwest::Error, url: String) -> Self {
        let kind = if err.is_timeout() {
            ServiceHttpErrorKind::Timeout
        } else if err.is_connect() {
            ServiceHttpErrorKind::Connect
        } else if err.is_request() {
            ServiceHttpErrorKind::Request
        } else if err.is_body() {
            ServiceHttpErrorKind::Body
        } else if err.is_decode() {
            ServiceHttpErrorKind::Decode
        } else {
            ServiceHttpErrorKind::Unknown
        };
        let status = err.status().map(|s| s.as_u16());
        let message = err.to_string();
        ServiceHttpError {
            service,
            kind,
            status,
            url: Some(url),
            message,
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn status_error(service: &'static str, status: u16, url: String, preview: String) -> Self {
        ServiceHttpError {
            service,
            kind: ServiceHttpErrorKind::Status,
            status: Some(status),
            url: Some(url),
            message: preview,
            source: None,
        }
    }

    fn decode_error(
        service: &'static str,
        status: u16,
        url: String,
        err: serde_json::Error,
        preview: String,
    ) -> Self {
        let message = format!("failed to decode response body: {} | body={}", err, preview);
        ServiceHttpError {
            service,
            kind: ServiceHttpErrorKind::Decode,
            status: Some(status),
            url: Some(url),
            message,
            source: Some(anyhow::Error::new(err)),
        }
    }
}

impl fmt::Display for ServiceHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} http error kind={}", self.service, self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        if let Some(url) = &self.url {
            write!(f, " url={}", url)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl StdError for ServiceHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

/// JSON-over-HTTP 客户端，可选 bearer 认证
#[derive(Clone)]
pub struct JsonHttpClient {
    service: &'static str,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl JsonHttpClient {
    pub fn new(
        service: &'static str,
        base_url: &str,
        api_key: String,
        timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            service,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> anyhow::Result<reqwest::Response> {
        let req = self.http.post(url).json(payload);
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| ServiceHttpError::from_reqwest(self.service, err, url.to_string()))?;
        Ok(resp)
    }

    /// POST 并解析 JSON 响应；成功但响应体为空时解析为 `Null`
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> anyhow::Result<Value> {
        let url = self.url(path);
        let resp = self.send(&url, payload).await?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| ServiceHttpError::from_reqwest(self.service, err, url.clone()))?;

        if !status.is_success() {
            let preview = preview_body(&body);
            return Err(
                ServiceHttpError::status_error(self.service, status.as_u16(), url, preview).into(),
            );
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str::<Value>(&body).map_err(|err| {
            let preview = preview_body(&body);
            ServiceHttpError::decode_error(self.service, status.as_u16(), url, err, preview).into()
        })
    }

    /// POST，只检查状态码
    pub async fn post_no_content<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> anyhow::Result<()> {
        let url = self.url(path);
        let resp = self.send(&url, payload).await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .map_err(|err| ServiceHttpError::from_reqwest(self.service, err, url.clone()))?;
        let preview = preview_body(&body);
        Err(ServiceHttpError::status_error(self.service, status.as_u16(), url, preview).into())
    }
}
