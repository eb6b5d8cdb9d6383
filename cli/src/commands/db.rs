//! 镜像数据库维护命令
use crate::commands::cli::{DbArgs, DbCommand, DbInfoArgs, DbInitArgs};
use bankbot_core::api as core_api;
use bankbot_core::api::SessionMirror;
use bankbot_plugins::mirror::SqliteSessionMirror;
use serde_json::json;

pub async fn handle_db(args: DbArgs, ctx: &core_api::AppContext) -> Result<(), core_api::CliError> {
    match args.command {
        DbCommand::Init(init_args) => handle_db_init(init_args, ctx).await,
        DbCommand::Info(info_args) => handle_db_info(info_args, ctx).await,
    }
}

/// 打开 `override_url` 或配置中的镜像；打开时执行迁移
pub async fn open_mirror(
    override_url: Option<&str>,
    ctx: &core_api::AppContext,
) -> Result<SqliteSessionMirror, core_api::CliError> {
    let cfg = &ctx.cfg().mirror;
    let url = override_url.unwrap_or(&cfg.database_url);
    SqliteSessionMirror::new(url, cfg.max_connections)
        .await
        .map_err(|e| core_api::CliError::Command(format!("failed to open mirror {url}: {e}")))
}

async fn handle_db_init(
    args: DbInitArgs,
    ctx: &core_api::AppContext,
) -> Result<(), core_api::CliError> {
    let mirror = open_mirror(args.database_url.as_deref(), ctx).await?;
    let health = mirror.health().await;
    mirror.close().await;

    let url = args
        .database_url
        .unwrap_or_else(|| ctx.cfg().mirror.database_url.clone());
    tracing::info!(database_url = %url, "mirror schema ready");
    println!(
        "{}",
        json!({
            "database_url": url,
            "status": health.status,
        })
    );
    Ok(())
}

async fn handle_db_info(
    args: DbInfoArgs,
    ctx: &core_api::AppContext,
) -> Result<(), core_api::CliError> {
    let mirror = open_mirror(args.database_url.as_deref(), ctx).await?;
    let health = mirror.health().await;
    let sessions = mirror.list_sessions(args.limit).await?;
    mirror.close().await;

    let sessions: Vec<_> = sessions
        .into_iter()
        .map(|(record, messages)| {
            json!({
                "session_id": record.session_id,
                "customer_id": record.customer_id,
                "created_at": record.created_at.to_rfc3339(),
                "messages": messages,
            })
        })
        .collect();

    let out = json!({
        "health": health,
        "sessions": sessions,
    });
    let rendered = serde_json::to_string_pretty(&out)
        .map_err(|e| core_api::CliError::Command(format!("failed to render info: {e}")))?;
    println!("{rendered}");
    Ok(())
}
