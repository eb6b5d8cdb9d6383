//! SQLite 持久化镜像：会话记录与有序聊天消息
//!
//! 会话行归首次写入它的客户所有，消息行同样携带 `customer_id`。
//! 删除与读取都按客户限定，其他客户同名 `session_id` 的写入会被拒绝。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
        SqliteSynchronous,
    },
    Row,
};
use std::path::Path;
use std::str::FromStr;

use bankbot_core::error::MirrorError;
use bankbot_core::mirror::{
    ChatMessageRecord, ChatRole, MirrorHealth, NewChatMessage, SessionMirror, SessionRecord,
};

pub struct SqliteSessionMirror {
    pool: SqlitePool,
}

/// 支持 `sqlite://path`、`sqlite:path` 或裸路径；展开 `~`
fn database_path(database_url: &str) -> String {
    let raw = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    shellexpand::tilde(raw).into_owned()
}

impl SqliteSessionMirror {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, MirrorError> {
        let path = database_path(database_url);
        if path == ":memory:" {
            return Self::new_in_memory().await;
        }

        if let Some(parent) = Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MirrorError::Connection(format!("failed to create directory: {e}"))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| MirrorError::Connection(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| MirrorError::Connection(format!("failed to connect to SQLite: {e}")))?;

        let mirror = Self { pool };
        mirror.run_migrations().await?;
        tracing::info!(target: "bankbot.mirror", path = %path, "sqlite mirror ready");
        Ok(mirror)
    }

    /// 单连接内存数据库
    pub async fn new_in_memory() -> Result<Self, MirrorError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MirrorError::Connection(format!("invalid SQLite path: {e}")))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MirrorError::Connection(format!("failed to connect to SQLite: {e}")))?;

        let mirror = Self { pool };
        mirror.run_migrations().await?;
        Ok(mirror)
    }

    pub async fn run_migrations(&self) -> Result<(), MirrorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                customer_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Migration(format!("failed to create chat_sessions: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                customer_id TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                agent_name TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Migration(format!("failed to create chat_messages: {e}")))?;

        self.add_message_owner_column().await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_chat_messages_owner_created
            ON chat_messages(session_id, customer_id, created_at, id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Migration(format!("failed to create index: {e}")))?;

        Ok(())
    }

    /// 旧库的 `chat_messages` 没有 `customer_id` 列：补列并按会话归属回填
    async fn add_message_owner_column(&self) -> Result<(), MirrorError> {
        let columns = sqlx::query("PRAGMA table_info(chat_messages)")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MirrorError::Migration(format!("failed to inspect chat_messages: {e}")))?;
        let has_owner = columns.iter().any(|row| {
            row.try_get::<String, _>("name")
                .map(|name| name == "customer_id")
                .unwrap_or(false)
        });
        if has_owner {
            return Ok(());
        }

        sqlx::query("ALTER TABLE chat_messages ADD COLUMN customer_id TEXT NOT NULL DEFAULT ''")
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::Migration(format!("failed to add customer_id: {e}")))?;
        sqlx::query(
            r#"
            UPDATE chat_messages
            SET customer_id = COALESCE(
                (SELECT s.customer_id FROM chat_sessions s WHERE s.session_id = chat_messages.session_id),
                ''
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Migration(format!("failed to backfill customer_id: {e}")))?;
        tracing::info!(target: "bankbot.mirror", "added customer_id to chat_messages");
        Ok(())
    }

    /// 会话及其消息数，按创建时间倒序
    pub async fn list_sessions(&self, limit: u32) -> Result<Vec<(SessionRecord, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT s.session_id, s.customer_id, s.created_at, s.updated_at,
                   (SELECT COUNT(*) FROM chat_messages m
                    WHERE m.session_id = s.session_id AND m.customer_id = s.customer_id) AS messages
            FROM chat_sessions s
            ORDER BY s.created_at DESC, s.id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MirrorError::Query(format!("failed to list sessions: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let count: i64 = row.try_get("messages")?;
                Ok((session_from_row(&row)?, count))
            })
            .collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn session_from_row(row: &SqliteRow) -> Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.try_get("session_id")?,
        customer_id: row.try_get("customer_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessageRecord> {
    let role: String = row.try_get("role")?;
    Ok(ChatMessageRecord {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        role: ChatRole::from_str(&role).map_err(|e| anyhow::anyhow!(e))?,
        content: row.try_get("content")?,
        agent_name: row.try_get("agent_name")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl SessionMirror for SqliteSessionMirror {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn record_session(&self, session_id: &str, customer_id: &str) -> Result<()> {
        let now = Utc::now();
        let affected = sqlx::query(
            r#"
            INSERT INTO chat_sessions (session_id, customer_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
                updated_at = ?3
            WHERE chat_sessions.customer_id = excluded.customer_id
            "#,
        )
        .bind(session_id)
        .bind(customer_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Query(format!("failed to record session: {e}")))?
        .rows_affected();

        if affected == 0 {
            return Err(MirrorError::ForeignOwner(session_id.to_string()).into());
        }
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, customer_id, created_at, updated_at
            FROM chat_sessions
            WHERE session_id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MirrorError::Query(format!("failed to load session: {e}")))?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn delete_session(&self, session_id: &str, customer_id: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MirrorError::Query(format!("failed to begin transaction: {e}")))?;

        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?1 AND customer_id = ?2")
            .bind(session_id)
            .bind(customer_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| MirrorError::Query(format!("failed to delete messages: {e}")))?;

        let removed =
            sqlx::query("DELETE FROM chat_sessions WHERE session_id = ?1 AND customer_id = ?2")
                .bind(session_id)
                .bind(customer_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| MirrorError::Query(format!("failed to delete session: {e}")))?
                .rows_affected();

        tx.commit()
            .await
            .map_err(|e| MirrorError::Query(format!("failed to commit delete: {e}")))?;
        Ok(removed > 0)
    }

    async fn append_message(
        &self,
        customer_id: &str,
        message: NewChatMessage,
    ) -> Result<ChatMessageRecord> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO chat_messages (session_id, customer_id, role, content, agent_name, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6
            WHERE NOT EXISTS (
                SELECT 1 FROM chat_sessions WHERE session_id = ?1 AND customer_id <> ?2
            )
            "#,
        )
        .bind(&message.session_id)
        .bind(customer_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.agent_name.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Query(format!("failed to append message: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(MirrorError::ForeignOwner(message.session_id).into());
        }
        let id = result.last_insert_rowid();

        Ok(ChatMessageRecord {
            id,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            agent_name: message.agent_name,
            created_at: now,
        })
    }

    async fn list_messages(
        &self,
        session_id: &str,
        customer_id: &str,
    ) -> Result<Vec<ChatMessageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, agent_name, created_at
            FROM chat_messages
            WHERE session_id = ?1 AND customer_id = ?2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MirrorError::Query(format!("failed to load messages: {e}")))?;

        rows.iter().map(message_from_row).collect()
    }

    async fn health(&self) -> MirrorHealth {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => MirrorHealth {
                pool_size: Some(self.pool.size()),
                idle_connections: Some(self.pool.num_idle()),
                ..MirrorHealth::healthy("sqlite")
            },
            Err(e) => MirrorHealth::unhealthy(e.to_string()),
        }
    }
}
