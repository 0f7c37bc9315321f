//! Source repository clients.
//!
//! A [`SourceClient`] lists the workflow documents a configured source
//! publishes and fetches their raw bytes. Two implementations ship:
//! [`GithubClient`] against the repository-hosting contents API, and
//! [`DirClient`] for a local directory of JSON documents. Both are pure
//! producers; nothing here touches the catalog.
//!
//! Failures are split into transient (worth retrying with backoff) and
//! permanent (not worth retrying); see [`FetchError`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use reqwest::StatusCode;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::config::{IngestConfig, SourceConfig};
use crate::error::FetchError;
use crate::models::RemoteEntry;

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// List the workflow documents this source currently publishes.
    async fn list(&self, source: &SourceConfig) -> Result<Vec<RemoteEntry>, FetchError>;

    /// Fetch the raw bytes of one listed entry.
    async fn fetch(&self, entry: &RemoteEntry) -> Result<Vec<u8>, FetchError>;
}

/// Build the client matching a source's `kind`.
pub fn client_for(
    source: &SourceConfig,
    ingest: &IngestConfig,
) -> Result<Box<dyn SourceClient>, FetchError> {
    match source.kind.as_str() {
        "github" => Ok(Box::new(GithubClient::new(ingest)?)),
        "directory" => Ok(Box::new(DirClient::new()?)),
        other => Err(FetchError::Permanent(format!(
            "unknown source kind '{}'",
            other
        ))),
    }
}

/// Fetch one entry with bounded exponential-backoff retry.
///
/// Only transient failures are retried (1s, 2s, 4s, ...); permanent
/// failures return immediately.
pub async fn fetch_with_retry(
    client: &dyn SourceClient,
    entry: &RemoteEntry,
    max_attempts: u32,
) -> Result<Vec<u8>, FetchError> {
    let mut last_err = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match client.fetch(entry).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    path = %entry.path,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    "transient fetch failure, retrying"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| FetchError::Transient("fetch retries exhausted".into())))
}

// ============ GitHub client ============

/// Client for the repository-hosting contents API.
///
/// Walks the configured path recursively, paginating each directory
/// listing, and collects every `.json` document with its blob revision.
pub struct GithubClient {
    http: reqwest::Client,
}

/// One item of a contents-API directory listing.
#[derive(Debug, Deserialize)]
struct ContentsItem {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
    html_url: Option<String>,
}

const CONTENTS_PAGE_SIZE: usize = 100;

impl GithubClient {
    pub fn new(ingest: &IngestConfig) -> Result<GithubClient, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ingest.timeout_secs))
            .user_agent(ingest.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Permanent(format!("http client: {}", e)))?;
        Ok(GithubClient { http })
    }

    /// One page of a directory listing.
    async fn list_page(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
        page: usize,
    ) -> Result<Vec<ContentsItem>, FetchError> {
        let url = format!(
            "https://api.github.com/repos/{}/contents/{}?ref={}&per_page={}&page={}",
            repo, path, branch, CONTENTS_PAGE_SIZE, page
        );

        let response = self.http.get(&url).send().await.map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let rate_remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, rate_remaining.as_deref(), &body));
        }

        response
            .json::<Vec<ContentsItem>>()
            .await
            .map_err(|e| FetchError::Permanent(format!("contents listing decode: {}", e)))
    }
}

#[async_trait]
impl SourceClient for GithubClient {
    async fn list(&self, source: &SourceConfig) -> Result<Vec<RemoteEntry>, FetchError> {
        let repo = source
            .repo
            .as_deref()
            .ok_or_else(|| FetchError::Permanent("github source has no repo".into()))?;

        let mut pending = vec![source.path.clone()];
        let mut entries = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut page = 1;
            loop {
                let items = self.list_page(repo, &dir, &source.branch, page).await?;
                // Anything other than an exactly-full page ends pagination
                // for this directory (including servers that return the
                // whole listing at once).
                let last_page = items.len() != CONTENTS_PAGE_SIZE;

                for item in items {
                    match item.kind.as_str() {
                        "dir" => pending.push(item.path),
                        "file" if item.path.ends_with(".json") => {
                            let Some(download_url) = item.download_url else {
                                continue;
                            };
                            entries.push(RemoteEntry {
                                path: item.path,
                                url: download_url,
                                revision: item.sha,
                                web_url: item.html_url,
                                popularity: None,
                            });
                        }
                        _ => {}
                    }
                }

                if last_page {
                    break;
                }
                page += 1;
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        tracing::debug!(repo, count = entries.len(), "listed workflow documents");
        Ok(entries)
    }

    async fn fetch(&self, entry: &RemoteEntry) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(&entry.url)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let rate_remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, rate_remaining.as_deref(), &body));
        }

        let bytes = response.bytes().await.map_err(classify_reqwest)?;
        Ok(bytes.to_vec())
    }
}

/// Map an HTTP error status to the retry taxonomy: rate limits and server
/// errors are transient; missing paths, bad references, and auth failures
/// are permanent.
fn classify_status(
    status: StatusCode,
    rate_remaining: Option<&str>,
    body: &str,
) -> FetchError {
    let detail = format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS {
        return FetchError::Transient(detail);
    }
    if status == StatusCode::FORBIDDEN && rate_remaining == Some("0") {
        return FetchError::Transient(format!("rate limited; {}", detail));
    }
    if status.is_server_error() {
        return FetchError::Transient(detail);
    }
    FetchError::Permanent(detail)
}

/// Network-level failures (timeouts, resets) are worth a retry.
fn classify_reqwest(e: reqwest::Error) -> FetchError {
    FetchError::Transient(e.to_string())
}

// ============ Directory client ============

/// Client for a local directory of workflow JSON documents. Used for
/// offline ingestion and as the test-suite source.
pub struct DirClient {
    include: GlobSet,
}

impl DirClient {
    pub fn new() -> Result<DirClient, FetchError> {
        let mut builder = GlobSetBuilder::new();
        builder.add(
            Glob::new("**/*.json")
                .map_err(|e| FetchError::Permanent(e.to_string()))?,
        );
        let include = builder
            .build()
            .map_err(|e| FetchError::Permanent(e.to_string()))?;
        Ok(DirClient { include })
    }
}

#[async_trait]
impl SourceClient for DirClient {
    async fn list(&self, source: &SourceConfig) -> Result<Vec<RemoteEntry>, FetchError> {
        let root = source
            .root
            .as_deref()
            .ok_or_else(|| FetchError::Permanent("directory source has no root".into()))?;
        if !root.exists() {
            return Err(FetchError::Permanent(format!(
                "directory '{}' does not exist",
                root.display()
            )));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| FetchError::Permanent(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();
            if !self.include.is_match(&rel_str) {
                continue;
            }

            entries.push(RemoteEntry {
                path: rel_str,
                url: path.display().to_string(),
                revision: file_revision(path),
                web_url: None,
                popularity: None,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn fetch(&self, entry: &RemoteEntry) -> Result<Vec<u8>, FetchError> {
        std::fs::read(&entry.url).map_err(|e| {
            FetchError::Permanent(format!("read '{}': {}", entry.url, e))
        })
    }
}

/// Filesystem revision tag: the mtime in unix seconds.
fn file_revision(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, None, "").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, None, "").is_transient());
        assert!(classify_status(StatusCode::FORBIDDEN, Some("0"), "").is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN, Some("41"), "").is_transient());
        assert!(!classify_status(StatusCode::NOT_FOUND, None, "").is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, None, "").is_transient());
    }

    fn dir_source(root: &Path) -> SourceConfig {
        SourceConfig {
            name: "local".to_string(),
            kind: "directory".to_string(),
            repo: None,
            path: String::new(),
            branch: "main".to_string(),
            root: Some(root.to_path_buf()),
            max_items: None,
        }
    }

    #[tokio::test]
    async fn dir_client_lists_json_documents_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("a.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "skip me").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/c.json"), "{}").unwrap();

        let client = DirClient::new().unwrap();
        let entries = client.list(&dir_source(tmp.path())).await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.json", "b.json", "sub/c.json"]);
    }

    #[tokio::test]
    async fn dir_client_fetches_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("wf.json"), b"{\"nodes\":[]}").unwrap();

        let client = DirClient::new().unwrap();
        let entries = client.list(&dir_source(tmp.path())).await.unwrap();
        let bytes = client.fetch(&entries[0]).await.unwrap();
        assert_eq!(bytes, b"{\"nodes\":[]}");
    }

    #[tokio::test]
    async fn dir_client_missing_root_is_permanent() {
        let client = DirClient::new().unwrap();
        let err = client
            .list(&dir_source(Path::new("/nonexistent/workflows")))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
