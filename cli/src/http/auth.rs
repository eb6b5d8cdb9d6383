//! 鉴权占位：要求 bearer token，客户身份取 `X-Customer-Id` 头或配置的默认客户。

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::models::HttpServerError;
use super::state::AppState;
use super::validation::validate_id;

pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// 当前请求对应的客户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentCustomer(pub String);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub fn resolve_customer(headers: &HeaderMap, default_customer: &str) -> String {
    headers
        .get(CUSTOMER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_customer)
        .to_string()
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentCustomer {
    type Rejection = HttpServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if bearer_token(&parts.headers).is_none() {
            return Err(HttpServerError::Unauthorized(
                "Missing bearer token".to_string(),
            ));
        }
        let customer = resolve_customer(&parts.headers, &state.config.http_server.default_customer_id);
        validate_id("customer_id", &customer)?;
        Ok(Self(customer))
    }
}
