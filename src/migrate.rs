use anyhow::Result;
use sqlx::SqlitePool;

/// Create the catalog schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Record table. Analysis columns are NULL for parse-failure records.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            tags TEXT,
            use_cases TEXT,
            repository TEXT NOT NULL,
            path TEXT NOT NULL,
            revision TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            source_url TEXT,
            author TEXT,
            node_count INTEGER,
            node_types TEXT,
            integrations TEXT,
            required_credentials TEXT,
            required_services TEXT,
            external_api_flag INTEGER,
            has_webhook INTEGER,
            has_schedule INTEGER,
            category TEXT,
            difficulty TEXT,
            local_ai INTEGER,
            compatibility_score REAL,
            compatibility_status TEXT,
            popularity_score REAL NOT NULL DEFAULT 0,
            ingested_at INTEGER NOT NULL,
            scorer_version INTEGER NOT NULL DEFAULT 0,
            parse_failure TEXT,
            UNIQUE(repository, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 shadow over the searchable fields, one row per analyzed record.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='workflows_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE workflows_fts USING fts5(
                workflow_id UNINDEXED,
                name,
                description,
                tags,
                use_cases
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_category ON workflows(category)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_difficulty ON workflows(difficulty)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_local_ai ON workflows(local_ai)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(compatibility_status)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_workflows_popularity ON workflows(popularity_score DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
