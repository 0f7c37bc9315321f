use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::rules::DEFAULT_LOCAL_SERVICES;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Size of the bounded worker pool for fetch+parse+score.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Fetch attempts per entry for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-fetch timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            workers: default_workers(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_workers() -> usize {
    8
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("workflow-catalog/{}", env!("CARGO_PKG_VERSION"))
}

/// Compatibility rules configuration: the known-local-service catalog.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_local_services")]
    pub local_services: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            local_services: default_local_services(),
        }
    }
}

fn default_local_services() -> Vec<String> {
    DEFAULT_LOCAL_SERVICES.iter().map(|s| s.to_string()).collect()
}

/// One configured source repository.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Name used to select the source on the CLI and label run summaries.
    pub name: String,
    /// `github` or `directory`.
    pub kind: String,
    /// `owner/repo`, required for github sources.
    #[serde(default)]
    pub repo: Option<String>,
    /// Subpath within the repository to scan. Empty scans the root.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Root directory, required for directory sources.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Cap on entries ingested from this source per run.
    #[serde(default)]
    pub max_items: Option<usize>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl SourceConfig {
    /// The repository label recorded on ingested records.
    pub fn repository(&self) -> String {
        match self.kind.as_str() {
            "github" => self.repo.clone().unwrap_or_default(),
            _ => self
                .root
                .as_ref()
                .map(|r| r.display().to_string())
                .unwrap_or_else(|| self.name.clone()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be > 0");
    }
    if config.ingest.max_retries == 0 {
        anyhow::bail!("ingest.max_retries must be > 0");
    }
    if config.catalog.local_services.is_empty() {
        anyhow::bail!("catalog.local_services must not be empty");
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if !seen.insert(source.name.as_str()) {
            anyhow::bail!("Duplicate source name: '{}'", source.name);
        }
        match source.kind.as_str() {
            "github" => {
                if source.repo.as_deref().unwrap_or("").is_empty() {
                    anyhow::bail!("Source '{}': github sources require 'repo'", source.name);
                }
            }
            "directory" => {
                if source.root.is_none() {
                    anyhow::bail!("Source '{}': directory sources require 'root'", source.name);
                }
            }
            other => anyhow::bail!(
                "Source '{}': unknown kind '{}'. Must be github or directory.",
                source.name,
                other
            ),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "data/catalog.sqlite"

[server]
bind = "127.0.0.1:8080"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.ingest.workers, 8);
        assert_eq!(cfg.ingest.max_retries, 3);
        assert!(cfg.catalog.local_services.contains(&"ollama".to_string()));
        assert!(cfg.sources.is_empty());
    }

    #[test]
    fn github_source_requires_repo() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "data/catalog.sqlite"

[server]
bind = "127.0.0.1:8080"

[[sources]]
name = "community"
kind = "github"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("require 'repo'"));
    }

    #[test]
    fn unknown_source_kind_rejected() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "data/catalog.sqlite"

[server]
bind = "127.0.0.1:8080"

[[sources]]
name = "x"
kind = "ftp"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unknown kind"));
    }

    #[test]
    fn duplicate_source_names_rejected() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "data/catalog.sqlite"

[server]
bind = "127.0.0.1:8080"

[[sources]]
name = "a"
kind = "directory"
root = "/tmp/a"

[[sources]]
name = "a"
kind = "directory"
root = "/tmp/b"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate source name"));
    }
}
