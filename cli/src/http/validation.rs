//! 基础请求验证逻辑

use super::models::HttpServerError;

const MAX_MESSAGE_CHARS: usize = 10_000;
const MAX_ID_CHARS: usize = 100;

/// 验证聊天消息
pub fn validate_message(message: &str) -> Result<(), HttpServerError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(HttpServerError::InvalidRequest(
            "Message cannot be empty".to_string(),
        ));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(HttpServerError::InvalidRequest(format!(
            "Message too long ({chars} chars, max {MAX_MESSAGE_CHARS})"
        )));
    }
    Ok(())
}

/// 验证标识符格式（customer_id / session_id：字母数字、下划线、连字符）
pub fn validate_id(kind: &str, id: &str) -> Result<(), HttpServerError> {
    if id.is_empty() {
        return Err(HttpServerError::InvalidRequest(format!(
            "{kind} cannot be empty"
        )));
    }

    if id.len() > MAX_ID_CHARS {
        return Err(HttpServerError::InvalidRequest(format!(
            "{kind} too long ({} chars, max {MAX_ID_CHARS})",
            id.len()
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(HttpServerError::InvalidRequest(format!(
            "{kind} can only contain alphanumeric, underscore, and hyphen characters"
        )));
    }

    Ok(())
}
