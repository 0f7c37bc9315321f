//! Catalog statistics and health overview.
//!
//! A quick summary of what the catalog holds: record counts, parse
//! failures, and per-category / per-status breakdowns. Used by
//! `wfcat stats` to confirm ingestion runs landed as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::store::CatalogStore;

pub async fn run_stats(config: &Config, store: &CatalogStore) -> Result<()> {
    let total = store.count().await?;
    let failures = store.failure_count().await?;

    let local_ai: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM workflows WHERE parse_failure IS NULL AND local_ai = 1",
    )
    .fetch_one(store.pool())
    .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Workflow Catalog — Stats");
    println!("========================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!();
    println!("  Workflows:      {}", total);
    println!("  Parse failures: {}", failures);
    println!("  Local AI:       {}", local_ai);

    let categories = store.categories().await?;
    if !categories.is_empty() {
        println!();
        println!("  By category:");
        for c in &categories {
            println!("    {:<28} {:>6}", c.name, c.workflow_count);
        }
    }

    let status_rows = sqlx::query(
        r#"
        SELECT compatibility_status, COUNT(*) AS n
        FROM workflows
        WHERE parse_failure IS NULL
        GROUP BY compatibility_status
        ORDER BY compatibility_status
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    if !status_rows.is_empty() {
        println!();
        println!("  By status:");
        for row in &status_rows {
            let status: String = row.get("compatibility_status");
            let n: i64 = row.get("n");
            println!("    {:<28} {:>6}", status, n);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
