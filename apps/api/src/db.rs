use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Idempotent schema DDL, applied statement by statement at startup.
/// Foreign keys are enforced per connection (see `create_pool`), so deleting
/// an agent cascades into its usage history.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ai_agents (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT    NOT NULL,
        description     TEXT,
        agent_type      TEXT    NOT NULL DEFAULT 'general',
        prompt_template TEXT    NOT NULL,
        is_builtin      BOOLEAN NOT NULL DEFAULT FALSE,
        usage_count     INTEGER NOT NULL DEFAULT 0,
        rating_count    INTEGER NOT NULL DEFAULT 0,
        average_rating  REAL    NOT NULL DEFAULT 0.0,
        created_at      TEXT    NOT NULL,
        updated_at      TEXT    NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_usage_history (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id       INTEGER NOT NULL REFERENCES ai_agents(id) ON DELETE CASCADE,
        analysis_id    INTEGER NOT NULL DEFAULT 0,
        rating         REAL,
        feedback       TEXT,
        execution_time REAL    NOT NULL DEFAULT 0.0,
        success        BOOLEAN NOT NULL DEFAULT TRUE,
        error_message  TEXT    NOT NULL DEFAULT '',
        created_at     TEXT    NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_agents_type ON ai_agents(agent_type)",
    "CREATE INDEX IF NOT EXISTS idx_agents_builtin ON ai_agents(is_builtin)",
    "CREATE INDEX IF NOT EXISTS idx_agent_usage_agent_id ON agent_usage_history(agent_id)",
];

/// Creates the SQLite connection pool and applies the schema.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Opening SQLite database...");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;

    info!("SQLite connection pool established");
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
