//! 从持久化镜像打印会话对话记录
use crate::commands::cli::TranscriptArgs;
use crate::commands::db::open_mirror;
use bankbot_core::api as core_api;
use bankbot_core::api::{ChatMessageRecord, SessionMirror};

pub async fn handle_transcript(
    args: TranscriptArgs,
    ctx: &core_api::AppContext,
) -> Result<i32, core_api::CliError> {
    let mirror = open_mirror(args.database_url.as_deref(), ctx).await?;
    let owner = match args.customer_id.clone() {
        Some(customer_id) => Some(customer_id),
        None => mirror
            .get_session(&args.session_id)
            .await?
            .map(|record| record.customer_id),
    };
    let messages = match owner.as_deref() {
        Some(customer_id) => mirror.list_messages(&args.session_id, customer_id).await?,
        None => Vec::new(),
    };
    mirror.close().await;

    if messages.is_empty() {
        eprintln!("no messages for session {}", args.session_id);
        return Ok(1);
    }

    for message in &messages {
        let line = if args.json {
            serde_json::to_string(message)
                .map_err(|e| core_api::CliError::Command(format!("failed to render: {e}")))?
        } else {
            format_line(message)
        };
        println!("{line}");
    }
    Ok(0)
}

pub fn format_line(message: &ChatMessageRecord) -> String {
    let who = match message.agent_name.as_deref() {
        Some(agent) => format!("{} ({agent})", message.role),
        None => message.role.to_string(),
    };
    format!(
        "[{}] {who}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        message.content
    )
}
