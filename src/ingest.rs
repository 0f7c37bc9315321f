//! Ingestion pipeline orchestration.
//!
//! Coordinates the full run: list entries from a source, pipeline each
//! through fetch → parse/analyze → score on a bounded worker pool, and
//! serialize the resulting upserts through a single writer. Per-item
//! failures are recorded and never abort the run; cancellation is
//! cooperative and always ends in an explicit partial summary.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{Config, SourceConfig};
use crate::error::{FetchError, StoreError};
use crate::fetch::{self, SourceClient};
use crate::models::{RemoteEntry, RunSummary, WorkflowRecord};
use crate::parser;
use crate::rules::RuleSet;
use crate::score::{self, SCORER_VERSION};
use crate::store::CatalogStore;

/// Stable record id: derived from repository and path, never from content.
pub fn workflow_id(repository: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repository.as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Content hash used for change detection across runs.
pub fn content_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

/// Outcome of one entry's trip through the worker pool.
enum ItemOutcome {
    /// Analyzed and scored, ready to store.
    Record(Box<WorkflowRecord>),
    /// Could not be analyzed; the failure record to store.
    ParseFailure(Box<WorkflowRecord>),
    FetchFailure { path: String, error: FetchError },
    /// Cancelled before the entry was processed.
    Skipped,
}

/// Run ingestion for one named source, or `all`.
pub async fn run_ingest(
    config: &Config,
    store: &CatalogStore,
    source_name: &str,
    limit: Option<usize>,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let selected: Vec<&SourceConfig> = if source_name == "all" {
        config.sources.iter().collect()
    } else {
        let matched: Vec<&SourceConfig> = config
            .sources
            .iter()
            .filter(|s| s.name == source_name)
            .collect();
        if matched.is_empty() {
            let known: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
            bail!(
                "Unknown source: '{}'. Configured sources: {}",
                source_name,
                if known.is_empty() {
                    "(none)".to_string()
                } else {
                    known.join(", ")
                }
            );
        }
        matched
    };

    let rules = Arc::new(RuleSet::new(config.catalog.local_services.clone()));

    let mut total = RunSummary {
        run_id: Uuid::new_v4().to_string(),
        source: source_name.to_string(),
        ..Default::default()
    };

    for source in selected {
        let summary =
            ingest_source(config, store, source, &rules, limit, dry_run, cancel.clone()).await?;
        total.absorb(&summary);
        if cancel.is_cancelled() {
            total.cancelled = true;
            break;
        }
    }

    Ok(total)
}

/// Ingest one source end to end.
async fn ingest_source(
    config: &Config,
    store: &CatalogStore,
    source: &SourceConfig,
    rules: &Arc<RuleSet>,
    limit: Option<usize>,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started = Instant::now();
    let mut summary = RunSummary {
        run_id: Uuid::new_v4().to_string(),
        source: source.name.clone(),
        ..Default::default()
    };

    let client: Arc<dyn SourceClient> = match fetch::client_for(source, &config.ingest) {
        Ok(client) => Arc::from(client),
        Err(e) => {
            tracing::warn!(source = %source.name, error = %e, "source client unavailable");
            summary.fetch_failures += 1;
            summary.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(summary);
        }
    };

    let mut entries = match client.list(source).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(source = %source.name, error = %e, "listing source failed");
            summary.fetch_failures += 1;
            summary.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(summary);
        }
    };

    if let Some(max) = source.max_items {
        entries.truncate(max);
    }
    if let Some(max) = limit {
        entries.truncate(max);
    }
    summary.listed = entries.len() as u64;

    if dry_run {
        println!("ingest {} (dry-run)", source.name);
        println!("  entries found: {}", entries.len());
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        return Ok(summary);
    }

    tracing::info!(
        source = %source.name,
        entries = entries.len(),
        workers = config.ingest.workers,
        "starting ingestion run"
    );

    // Bounded worker pool for fetch+parse+score; results flow to this
    // task, which is the only writer and so serializes all upserts.
    let semaphore = Arc::new(Semaphore::new(config.ingest.workers));
    let (tx, mut rx) = mpsc::channel::<ItemOutcome>(config.ingest.workers.max(1) * 2);
    let mut workers = JoinSet::new();

    let repository = source.repository();
    for entry in entries {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        let client = client.clone();
        let rules = rules.clone();
        let cancel = cancel.clone();
        let repository = repository.clone();
        let max_attempts = config.ingest.max_retries;

        workers.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            if cancel.is_cancelled() {
                let _ = tx.send(ItemOutcome::Skipped).await;
                return;
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => ItemOutcome::Skipped,
                outcome = process_entry(client, entry, repository, rules, max_attempts) => outcome,
            };
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    // Writer loop: dedup within the run (latest wins), hash no-op check,
    // one retry on a failed upsert transaction.
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(outcome) = rx.recv().await {
        match outcome {
            ItemOutcome::Skipped => {}
            ItemOutcome::FetchFailure { path, error } => {
                tracing::warn!(path = %path, error = %error, "entry fetch failed");
                summary.fetch_failures += 1;
            }
            ItemOutcome::Record(record) => {
                if !record_changed(store, &record).await {
                    summary.unchanged += 1;
                    continue;
                }
                if !seen.insert(record.id.clone()) {
                    summary.deduped += 1;
                }
                match upsert_with_retry(store, &record).await {
                    Ok(()) => {
                        summary.upserted += 1;
                        *summary
                            .by_category
                            .entry(record.category.as_str().to_string())
                            .or_default() += 1;
                        *summary
                            .by_difficulty
                            .entry(record.difficulty.as_str().to_string())
                            .or_default() += 1;
                        *summary
                            .by_status
                            .entry(record.compatibility_status.as_str().to_string())
                            .or_default() += 1;
                    }
                    Err(e) => {
                        tracing::warn!(id = %record.id, error = %e, "upsert failed");
                        summary.store_failures += 1;
                    }
                }
            }
            ItemOutcome::ParseFailure(record) => {
                if !record_changed(store, &record).await {
                    summary.unchanged += 1;
                    continue;
                }
                if !seen.insert(record.id.clone()) {
                    summary.deduped += 1;
                }
                match upsert_with_retry(store, &record).await {
                    Ok(()) => summary.parse_failures += 1,
                    Err(e) => {
                        tracing::warn!(id = %record.id, error = %e, "failure record upsert failed");
                        summary.store_failures += 1;
                    }
                }
            }
        }
    }

    while workers.join_next().await.is_some() {}

    summary.cancelled = cancel.is_cancelled();
    summary.elapsed_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        source = %summary.source,
        upserted = summary.upserted,
        unchanged = summary.unchanged,
        failures = summary.failures(),
        cancelled = summary.cancelled,
        "ingestion run finished"
    );

    Ok(summary)
}

/// Fetch, parse, analyze, and score one entry. Never panics a batch:
/// every failure path maps to an outcome.
async fn process_entry(
    client: Arc<dyn SourceClient>,
    entry: RemoteEntry,
    repository: String,
    rules: Arc<RuleSet>,
    max_attempts: u32,
) -> ItemOutcome {
    let id = workflow_id(&repository, &entry.path);

    let raw = match fetch::fetch_with_retry(client.as_ref(), &entry, max_attempts).await {
        Ok(raw) => raw,
        Err(error) => {
            return ItemOutcome::FetchFailure {
                path: entry.path,
                error,
            }
        }
    };

    let hash = content_hash(&raw);
    let now = chrono::Utc::now().timestamp();

    match parser::parse(&raw) {
        Ok(parsed) => {
            let analysis = parser::analyze(&parsed, &rules);
            let compat = score::score(&analysis, &rules);

            let name = parsed.name.clone().unwrap_or_else(|| {
                entry
                    .path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&entry.path)
                    .trim_end_matches(".json")
                    .to_string()
            });
            let author = repository
                .split('/')
                .next()
                .filter(|owner| !owner.is_empty() && repository.contains('/'))
                .map(str::to_string);

            ItemOutcome::Record(Box::new(WorkflowRecord {
                id,
                name,
                description: parsed.description.clone(),
                tags: analysis.tags.clone(),
                use_cases: analysis.use_cases.clone(),
                repository,
                path: entry.path,
                revision: entry.revision,
                content_hash: hash,
                source_url: entry.web_url,
                author,
                node_count: analysis.node_count,
                node_types: analysis.node_types.clone(),
                integrations: analysis.integrations.clone(),
                required_credentials: analysis.required_credentials.clone(),
                required_services: analysis.required_services.clone(),
                external_api_flag: analysis.external_api_flag,
                has_webhook: analysis.has_webhook,
                has_schedule: analysis.has_schedule,
                category: analysis.category,
                difficulty: analysis.difficulty,
                local_ai: compat.local_ai,
                compatibility_score: compat.score,
                compatibility_status: compat.status,
                popularity_score: entry.popularity.unwrap_or(0.0),
                ingested_at: now,
                scorer_version: SCORER_VERSION,
                parse_failure: None,
            }))
        }
        Err(e) => {
            tracing::debug!(path = %entry.path, error = %e, "workflow failed to parse");
            ItemOutcome::ParseFailure(Box::new(WorkflowRecord::failed(
                id,
                repository,
                entry.path,
                entry.revision,
                hash,
                e.to_string(),
                now,
            )))
        }
    }
}

/// Re-ingesting an entry whose content hash is unchanged is a no-op.
/// A read error here is not fatal: the entry is treated as changed and
/// any real store problem surfaces on the upsert, where it is counted.
async fn record_changed(store: &CatalogStore, record: &WorkflowRecord) -> bool {
    match store.content_hash(&record.id).await {
        Ok(Some(existing)) => existing != record.content_hash,
        Ok(None) => true,
        Err(e) => {
            tracing::debug!(id = %record.id, error = %e, "content-hash lookup failed");
            true
        }
    }
}

/// A failed upsert transaction gets exactly one retry before it is
/// recorded as a per-item failure.
async fn upsert_with_retry(store: &CatalogStore, record: &WorkflowRecord) -> Result<(), StoreError> {
    match store.upsert(record).await {
        Err(StoreError::TransactionFailed(first)) => {
            tracing::debug!(id = %record.id, error = %first, "upsert transaction failed, retrying");
            store.upsert(record).await
        }
        other => other,
    }
}

/// Human-readable run report, printed by the CLI after a run.
pub fn print_summary(summary: &RunSummary) {
    println!("ingest {}", summary.source);
    println!("  listed: {}", summary.listed);
    println!("  upserted: {}", summary.upserted);
    println!("  unchanged: {}", summary.unchanged);
    if summary.deduped > 0 {
        println!("  deduplicated: {}", summary.deduped);
    }
    println!("  parse failures: {}", summary.parse_failures);
    println!("  fetch failures: {}", summary.fetch_failures);
    if summary.store_failures > 0 {
        println!("  store failures: {}", summary.store_failures);
    }
    if !summary.by_category.is_empty() {
        println!("  by category:");
        for (category, count) in &summary.by_category {
            println!("    {:<28} {}", category, count);
        }
    }
    if !summary.by_difficulty.is_empty() {
        println!("  by difficulty:");
        for (difficulty, count) in &summary.by_difficulty {
            println!("    {:<28} {}", difficulty, count);
        }
    }
    if !summary.by_status.is_empty() {
        println!("  by status:");
        for (status, count) in &summary.by_status {
            println!("    {:<28} {}", status, count);
        }
    }
    println!("  elapsed: {} ms", summary.elapsed_ms);
    if summary.cancelled {
        println!("cancelled (partial run)");
    } else {
        println!("ok");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_is_stable_and_path_sensitive() {
        let a = workflow_id("org/repo", "flows/a.json");
        let b = workflow_id("org/repo", "flows/a.json");
        let c = workflow_id("org/repo", "flows/b.json");
        let d = workflow_id("other/repo", "flows/a.json");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn content_hash_tracks_bytes() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }
}
