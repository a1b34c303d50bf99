use anyhow::Result;
use sqlx::SqlitePool;

/// Create the knowledge-base schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            source_id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            category TEXT,
            title TEXT,
            stale INTEGER NOT NULL DEFAULT 0,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source_type ON records(source_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_content_hash ON records(content_hash)")
        .execute(pool)
        .await?;

    Ok(())
}
