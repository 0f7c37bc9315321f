//! Core data models used throughout the workflow catalog.
//!
//! These types represent the workflow documents, derived analysis facts,
//! and catalog records that flow through the ingestion pipeline and are
//! served by the query API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Entry listed by a source repository client before its content is fetched.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Path of the workflow document within the repository.
    pub path: String,
    /// Location the raw bytes can be fetched from (URL or local file path).
    pub url: String,
    /// Revision of the entry (commit SHA, file revision, or mtime tag).
    pub revision: String,
    /// Browsable web URL, when the source can produce one.
    pub web_url: Option<String>,
    /// Popularity supplied by the source listing, when available.
    pub popularity: Option<f64>,
}

/// A single node in a workflow graph.
#[derive(Debug, Clone)]
pub struct WorkflowNode {
    pub id: String,
    pub node_type: String,
    pub parameters: serde_json::Value,
    /// Declared credential slot names, lowercased.
    pub credentials: Vec<String>,
}

/// A validated workflow document: named node graph plus declared metadata.
#[derive(Debug, Clone)]
pub struct ParsedWorkflow {
    pub name: Option<String>,
    pub description: Option<String>,
    pub declared_tags: Vec<String>,
    pub nodes: Vec<WorkflowNode>,
}

/// Facts derived from a parsed workflow by the analyzer.
#[derive(Debug, Clone, Default)]
pub struct WorkflowAnalysis {
    pub node_count: i64,
    /// Distinct node type identifiers, sorted.
    pub node_types: Vec<String>,
    /// Integration names extracted from node type namespaces, sorted.
    pub integrations: Vec<String>,
    /// Declared credential slot names, sorted and lowercased.
    pub required_credentials: Vec<String>,
    /// Known local services this workflow depends on, sorted.
    pub required_services: Vec<String>,
    /// True when any node is a third-party connector outside the
    /// known-service catalog.
    pub external_api_flag: bool,
    pub has_webhook: bool,
    pub has_schedule: bool,
    pub category: Category,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub use_cases: Vec<String>,
}

/// Fixed category set, in priority order (ties resolve to the first listed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "AI & Machine Learning")]
    AiMachineLearning,
    #[serde(rename = "Communication & Messaging")]
    CommunicationMessaging,
    #[serde(rename = "Data & Analytics")]
    DataAnalytics,
    #[serde(rename = "Business & Productivity")]
    BusinessProductivity,
    #[serde(rename = "Utilities & Tools")]
    UtilitiesTools,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::AiMachineLearning,
        Category::CommunicationMessaging,
        Category::DataAnalytics,
        Category::BusinessProductivity,
        Category::UtilitiesTools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AiMachineLearning => "AI & Machine Learning",
            Category::CommunicationMessaging => "Communication & Messaging",
            Category::DataAnalytics => "Data & Analytics",
            Category::BusinessProductivity => "Business & Productivity",
            Category::UtilitiesTools => "Utilities & Tools",
        }
    }

    /// URL-friendly identifier used by the categories endpoint.
    pub fn slug(&self) -> String {
        self.as_str()
            .to_lowercase()
            .replace(" & ", "-")
            .replace(' ', "-")
    }

    /// Parse either the display name or the slug.
    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s) || c.slug() == s.to_lowercase())
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::UtilitiesTools
    }
}

/// Difficulty level derived from graph size and control-flow constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Difficulty> {
        match s.to_lowercase().as_str() {
            "beginner" => Some(Difficulty::Beginner),
            "intermediate" => Some(Difficulty::Intermediate),
            "advanced" => Some(Difficulty::Advanced),
            _ => None,
        }
    }

    /// One level harder, saturating at advanced.
    pub fn escalate(self) -> Difficulty {
        match self {
            Difficulty::Beginner => Difficulty::Intermediate,
            _ => Difficulty::Advanced,
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Beginner
    }
}

/// Compatibility status, always derived from the score and external-API flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityStatus {
    FullyCompatible,
    PartiallyCompatible,
    RequiresExternal,
    Incompatible,
}

impl CompatibilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityStatus::FullyCompatible => "fully_compatible",
            CompatibilityStatus::PartiallyCompatible => "partially_compatible",
            CompatibilityStatus::RequiresExternal => "requires_external",
            CompatibilityStatus::Incompatible => "incompatible",
        }
    }

    pub fn parse(s: &str) -> Option<CompatibilityStatus> {
        match s {
            "fully_compatible" => Some(CompatibilityStatus::FullyCompatible),
            "partially_compatible" => Some(CompatibilityStatus::PartiallyCompatible),
            "requires_external" => Some(CompatibilityStatus::RequiresExternal),
            "incompatible" => Some(CompatibilityStatus::Incompatible),
            _ => None,
        }
    }
}

impl Default for CompatibilityStatus {
    fn default() -> Self {
        CompatibilityStatus::Incompatible
    }
}

/// Result of the compatibility scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compatibility {
    pub score: f64,
    pub status: CompatibilityStatus,
    pub local_ai: bool,
}

/// The catalog entity.
///
/// A record with `parse_failure` set carries no derived analysis fields;
/// the store writes NULLs for them and loads them back as defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub use_cases: Vec<String>,

    pub repository: String,
    pub path: String,
    pub revision: String,
    pub content_hash: String,
    pub source_url: Option<String>,
    pub author: Option<String>,

    pub node_count: i64,
    pub node_types: Vec<String>,
    pub integrations: Vec<String>,
    pub required_credentials: Vec<String>,
    pub required_services: Vec<String>,
    pub external_api_flag: bool,
    pub has_webhook: bool,
    pub has_schedule: bool,

    pub category: Category,
    pub difficulty: Difficulty,
    pub local_ai: bool,
    pub compatibility_score: f64,
    pub compatibility_status: CompatibilityStatus,

    pub popularity_score: f64,
    pub ingested_at: i64,
    pub scorer_version: i64,
    pub parse_failure: Option<String>,
}

impl WorkflowRecord {
    /// Build the failure-only record stored when a source document could
    /// not be analyzed. Derived fields stay at their defaults and are
    /// persisted as NULLs.
    pub fn failed(
        id: String,
        repository: String,
        path: String,
        revision: String,
        content_hash: String,
        reason: String,
        ingested_at: i64,
    ) -> WorkflowRecord {
        let name = path
            .rsplit('/')
            .next()
            .unwrap_or(&path)
            .trim_end_matches(".json")
            .to_string();
        WorkflowRecord {
            id,
            name,
            description: None,
            tags: Vec::new(),
            use_cases: Vec::new(),
            repository,
            path,
            revision,
            content_hash,
            source_url: None,
            author: None,
            node_count: 0,
            node_types: Vec::new(),
            integrations: Vec::new(),
            required_credentials: Vec::new(),
            required_services: Vec::new(),
            external_api_flag: false,
            has_webhook: false,
            has_schedule: false,
            category: Category::default(),
            difficulty: Difficulty::default(),
            local_ai: false,
            compatibility_score: 0.0,
            compatibility_status: CompatibilityStatus::default(),
            popularity_score: 0.0,
            ingested_at,
            scorer_version: 0,
            parse_failure: Some(reason),
        }
    }
}

/// Statistics accumulated over one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: String,
    pub listed: u64,
    pub upserted: u64,
    pub unchanged: u64,
    pub deduped: u64,
    pub parse_failures: u64,
    pub fetch_failures: u64,
    pub store_failures: u64,
    pub cancelled: bool,
    pub by_category: BTreeMap<String, u64>,
    pub by_difficulty: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn failures(&self) -> u64 {
        self.parse_failures + self.fetch_failures + self.store_failures
    }

    /// Fold another source's summary into an all-sources total.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.listed += other.listed;
        self.upserted += other.upserted;
        self.unchanged += other.unchanged;
        self.deduped += other.deduped;
        self.parse_failures += other.parse_failures;
        self.fetch_failures += other.fetch_failures;
        self.store_failures += other.store_failures;
        self.cancelled |= other.cancelled;
        for (k, v) in &other.by_category {
            *self.by_category.entry(k.clone()).or_default() += v;
        }
        for (k, v) in &other.by_difficulty {
            *self.by_difficulty.entry(k.clone()).or_default() += v;
        }
        for (k, v) in &other.by_status {
            *self.by_status.entry(k.clone()).or_default() += v;
        }
        self.elapsed_ms += other.elapsed_ms;
    }
}
