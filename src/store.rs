//! The catalog store: record table plus its full-text shadow index,
//! maintained as one consistency unit.
//!
//! Every write that touches a record also rewrites its FTS row inside the
//! same transaction, so readers can never observe a record whose indexed
//! text disagrees with its stored fields. Ordering is total
//! (popularity desc, name asc, id asc), which keeps pagination stable:
//! sequential pages over a static catalog neither skip nor repeat rows.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::models::{Category, CompatibilityStatus, Difficulty, WorkflowAnalysis, WorkflowRecord};
use crate::rules::RuleSet;
use crate::score::{self, SCORER_VERSION};

/// Filter predicates shared by `query` and `search`.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub local_ai_only: bool,
    pub tags: Vec<String>,
}

/// One page of catalog results.
#[derive(Debug, Serialize)]
pub struct Page {
    pub workflows: Vec<WorkflowRecord>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Category with its analyzed-record count.
#[derive(Debug, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub slug: String,
    pub workflow_count: i64,
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> CatalogStore {
        CatalogStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert-or-update a record and its FTS row in one transaction.
    ///
    /// Parse-failure records store NULL analysis columns and get no FTS
    /// row; an earlier analyzed record overwritten by a failure also has
    /// its stale FTS row removed.
    pub async fn upsert(&self, record: &WorkflowRecord) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        let analyzed = record.parse_failure.is_none();

        let tags_json = serde_json::to_string(&record.tags)?;
        let use_cases_json = serde_json::to_string(&record.use_cases)?;
        let node_types_json = serde_json::to_string(&record.node_types)?;
        let integrations_json = serde_json::to_string(&record.integrations)?;
        let credentials_json = serde_json::to_string(&record.required_credentials)?;
        let services_json = serde_json::to_string(&record.required_services)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (
                id, name, description, tags, use_cases,
                repository, path, revision, content_hash, source_url, author,
                node_count, node_types, integrations, required_credentials,
                required_services, external_api_flag, has_webhook, has_schedule,
                category, difficulty, local_ai, compatibility_score,
                compatibility_status, popularity_score, ingested_at,
                scorer_version, parse_failure
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                tags = excluded.tags,
                use_cases = excluded.use_cases,
                repository = excluded.repository,
                path = excluded.path,
                revision = excluded.revision,
                content_hash = excluded.content_hash,
                source_url = excluded.source_url,
                author = excluded.author,
                node_count = excluded.node_count,
                node_types = excluded.node_types,
                integrations = excluded.integrations,
                required_credentials = excluded.required_credentials,
                required_services = excluded.required_services,
                external_api_flag = excluded.external_api_flag,
                has_webhook = excluded.has_webhook,
                has_schedule = excluded.has_schedule,
                category = excluded.category,
                difficulty = excluded.difficulty,
                local_ai = excluded.local_ai,
                compatibility_score = excluded.compatibility_score,
                compatibility_status = excluded.compatibility_status,
                popularity_score = excluded.popularity_score,
                ingested_at = excluded.ingested_at,
                scorer_version = excluded.scorer_version,
                parse_failure = excluded.parse_failure
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(analyzed.then_some(tags_json.as_str()))
        .bind(analyzed.then_some(use_cases_json.as_str()))
        .bind(&record.repository)
        .bind(&record.path)
        .bind(&record.revision)
        .bind(&record.content_hash)
        .bind(&record.source_url)
        .bind(&record.author)
        .bind(analyzed.then_some(record.node_count))
        .bind(analyzed.then_some(node_types_json.as_str()))
        .bind(analyzed.then_some(integrations_json.as_str()))
        .bind(analyzed.then_some(credentials_json.as_str()))
        .bind(analyzed.then_some(services_json.as_str()))
        .bind(analyzed.then_some(record.external_api_flag))
        .bind(analyzed.then_some(record.has_webhook))
        .bind(analyzed.then_some(record.has_schedule))
        .bind(analyzed.then_some(record.category.as_str()))
        .bind(analyzed.then_some(record.difficulty.as_str()))
        .bind(analyzed.then_some(record.local_ai))
        .bind(analyzed.then_some(record.compatibility_score))
        .bind(analyzed.then_some(record.compatibility_status.as_str()))
        .bind(record.popularity_score)
        .bind(record.ingested_at)
        .bind(record.scorer_version)
        .bind(&record.parse_failure)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        sqlx::query("DELETE FROM workflows_fts WHERE workflow_id = ?")
            .bind(&record.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        if analyzed {
            sqlx::query(
                r#"
                INSERT INTO workflows_fts (workflow_id, name, description, tags, use_cases)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.name)
            .bind(record.description.as_deref().unwrap_or(""))
            .bind(record.tags.join(" "))
            .bind(record.use_cases.join(" "))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<WorkflowRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// Stored content hash for an id, used for the unchanged-entry no-op.
    pub async fn content_hash(&self, id: &str) -> Result<Option<String>, StoreError> {
        let hash = sqlx::query_scalar("SELECT content_hash FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    /// Filtered, stably-ordered page over analyzed records.
    pub async fn query(
        &self,
        filters: &QueryFilters,
        page: u32,
        page_size: u32,
    ) -> Result<Page, StoreError> {
        let (where_sql, binds) = filter_clauses(filters, "");

        let count_sql = format!(
            "SELECT COUNT(*) FROM workflows WHERE parse_failure IS NULL{}",
            where_sql
        );
        let mut count_query = sqlx::query_scalar(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let select_sql = format!(
            "SELECT * FROM workflows WHERE parse_failure IS NULL{} \
             ORDER BY popularity_score DESC, name ASC, id ASC LIMIT ? OFFSET ?",
            where_sql
        );
        let mut select_query = sqlx::query(&select_sql);
        for bind in &binds {
            select_query = select_query.bind(bind);
        }
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;
        let rows = select_query
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let workflows = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            workflows,
            total,
            page,
            page_size,
        })
    }

    /// Full-text search combined with the standard filters. Ranked by
    /// bm25 relevance, tie-broken by the default catalog ordering.
    pub async fn search(
        &self,
        text: &str,
        filters: &QueryFilters,
        page: u32,
        page_size: u32,
    ) -> Result<Page, StoreError> {
        let Some(match_expr) = fts_match_expression(text) else {
            return Ok(Page {
                workflows: Vec::new(),
                total: 0,
                page,
                page_size,
            });
        };

        let (where_sql, binds) = filter_clauses(filters, "w.");

        let count_sql = format!(
            "SELECT COUNT(*) FROM workflows_fts \
             JOIN workflows w ON w.id = workflows_fts.workflow_id \
             WHERE workflows_fts MATCH ? AND w.parse_failure IS NULL{}",
            where_sql,
        );
        let mut count_query = sqlx::query_scalar(&count_sql).bind(&match_expr);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let select_sql = format!(
            "SELECT w.* FROM workflows_fts \
             JOIN workflows w ON w.id = workflows_fts.workflow_id \
             WHERE workflows_fts MATCH ? AND w.parse_failure IS NULL{} \
             ORDER BY workflows_fts.rank, w.popularity_score DESC, w.name ASC, w.id ASC \
             LIMIT ? OFFSET ?",
            where_sql,
        );
        let mut select_query = sqlx::query(&select_sql).bind(&match_expr);
        for bind in &binds {
            select_query = select_query.bind(bind);
        }
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;
        let rows = select_query
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let workflows = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            workflows,
            total,
            page,
            page_size,
        })
    }

    pub async fn categories(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS workflow_count
            FROM workflows
            WHERE parse_failure IS NULL
            GROUP BY category
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("category");
                let slug = Category::parse(&name)
                    .map(|c| c.slug())
                    .unwrap_or_else(|| name.to_lowercase().replace(' ', "-"));
                CategoryCount {
                    name,
                    slug,
                    workflow_count: row.get("workflow_count"),
                }
            })
            .collect())
    }

    /// Count of analyzed records in the catalog.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM workflows WHERE parse_failure IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn failure_count(&self) -> Result<i64, StoreError> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM workflows WHERE parse_failure IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Re-derive score, status, and local-AI flag for every analyzed
    /// record carrying a stale scorer version. Uses only stored facts; no
    /// fetching or parsing happens here.
    pub async fn rescore_all(&self, rules: &RuleSet) -> Result<u64, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, node_types, required_credentials, external_api_flag
            FROM workflows
            WHERE parse_failure IS NULL AND scorer_version != ?
            "#,
        )
        .bind(SCORER_VERSION)
        .fetch_all(&self.pool)
        .await?;

        let mut updated = 0u64;
        for row in &rows {
            let id: String = row.get("id");
            let analysis = WorkflowAnalysis {
                node_types: json_column(row, "node_types")?,
                required_credentials: json_column(row, "required_credentials")?,
                external_api_flag: row.get::<Option<bool>, _>("external_api_flag").unwrap_or(false),
                ..Default::default()
            };
            let compat = score::score(&analysis, rules);

            sqlx::query(
                r#"
                UPDATE workflows SET
                    local_ai = ?,
                    compatibility_score = ?,
                    compatibility_status = ?,
                    scorer_version = ?
                WHERE id = ?
                "#,
            )
            .bind(compat.local_ai)
            .bind(compat.score)
            .bind(compat.status.as_str())
            .bind(SCORER_VERSION)
            .bind(&id)
            .execute(&self.pool)
            .await?;
            updated += 1;
        }

        Ok(updated)
    }
}

/// Shared WHERE fragment for the filter predicates. Returns the SQL tail
/// (each clause prefixed with ` AND `, columns qualified with `prefix`)
/// and its string binds in order.
fn filter_clauses(filters: &QueryFilters, prefix: &str) -> (String, Vec<String>) {
    let mut sql = String::new();
    let mut binds = Vec::new();

    if let Some(category) = filters.category {
        sql.push_str(&format!(" AND {}category = ?", prefix));
        binds.push(category.as_str().to_string());
    }
    if let Some(difficulty) = filters.difficulty {
        sql.push_str(&format!(" AND {}difficulty = ?", prefix));
        binds.push(difficulty.as_str().to_string());
    }
    if filters.local_ai_only {
        sql.push_str(&format!(" AND {}local_ai = 1", prefix));
    }
    for tag in &filters.tags {
        sql.push_str(&format!(" AND {}tags LIKE ?", prefix));
        binds.push(format!("%\"{}\"%", tag.to_lowercase()));
    }

    (sql, binds)
}

/// Build a case-insensitive prefix-token MATCH expression, or `None` for
/// a query with no searchable tokens. Tokens are quoted so user input
/// cannot inject FTS5 operator syntax.
fn fts_match_expression(text: &str) -> Option<String> {
    let tokens: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"*", t))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" AND "))
    }
}

fn json_column(row: &SqliteRow, column: &str) -> Result<Vec<String>, StoreError> {
    let raw: Option<String> = row.get(column);
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

fn record_from_row(row: &SqliteRow) -> Result<WorkflowRecord, StoreError> {
    let category: Option<String> = row.get("category");
    let difficulty: Option<String> = row.get("difficulty");
    let status: Option<String> = row.get("compatibility_status");

    Ok(WorkflowRecord {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        tags: json_column(row, "tags")?,
        use_cases: json_column(row, "use_cases")?,
        repository: row.get("repository"),
        path: row.get("path"),
        revision: row.get("revision"),
        content_hash: row.get("content_hash"),
        source_url: row.get("source_url"),
        author: row.get("author"),
        node_count: row.get::<Option<i64>, _>("node_count").unwrap_or(0),
        node_types: json_column(row, "node_types")?,
        integrations: json_column(row, "integrations")?,
        required_credentials: json_column(row, "required_credentials")?,
        required_services: json_column(row, "required_services")?,
        external_api_flag: row
            .get::<Option<bool>, _>("external_api_flag")
            .unwrap_or(false),
        has_webhook: row.get::<Option<bool>, _>("has_webhook").unwrap_or(false),
        has_schedule: row.get::<Option<bool>, _>("has_schedule").unwrap_or(false),
        category: category
            .as_deref()
            .and_then(Category::parse)
            .unwrap_or_default(),
        difficulty: difficulty
            .as_deref()
            .and_then(Difficulty::parse)
            .unwrap_or_default(),
        local_ai: row.get::<Option<bool>, _>("local_ai").unwrap_or(false),
        compatibility_score: row
            .get::<Option<f64>, _>("compatibility_score")
            .unwrap_or(0.0),
        compatibility_status: status
            .as_deref()
            .and_then(CompatibilityStatus::parse)
            .unwrap_or_default(),
        popularity_score: row.get("popularity_score"),
        ingested_at: row.get("ingested_at"),
        scorer_version: row.get("scorer_version"),
        parse_failure: row.get("parse_failure"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_expression_quotes_and_prefixes_tokens() {
        assert_eq!(
            fts_match_expression("ChatBot local"),
            Some("\"chatbot\"* AND \"local\"*".to_string())
        );
        assert_eq!(fts_match_expression("  ,;  "), None);
        // Operator words are neutralized by quoting.
        assert_eq!(
            fts_match_expression("NOT OR"),
            Some("\"not\"* AND \"or\"*".to_string())
        );
    }

    #[test]
    fn filter_clauses_bind_in_order() {
        let filters = QueryFilters {
            category: Some(Category::DataAnalytics),
            difficulty: Some(Difficulty::Beginner),
            local_ai_only: true,
            tags: vec!["Email".to_string()],
        };
        let (sql, binds) = filter_clauses(&filters, "");
        assert_eq!(
            sql,
            " AND category = ? AND difficulty = ? AND local_ai = 1 AND tags LIKE ?"
        );
        assert_eq!(
            binds,
            vec![
                "Data & Analytics".to_string(),
                "beginner".to_string(),
                "%\"email\"%".to_string()
            ]
        );
    }
}
