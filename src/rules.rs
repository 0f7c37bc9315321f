//! Classification rule tables and the node classifier seam.
//!
//! Categories, service detection, difficulty thresholds, and local-AI
//! patterns are data here, not branches in the parser or scorer. Changing
//! a rule means editing a table; the analysis code stays untouched. The
//! [`NodeClassifier`] trait lets a custom build plug in new integration
//! detection without modifying the parser.

use crate::models::Category;

/// Known local infrastructure services. Node types or credentials that
/// reference one of these never count as an external API dependency.
/// Overridable via `[catalog] local_services` in the config.
pub const DEFAULT_LOCAL_SERVICES: &[&str] = &[
    "ollama",
    "postgres",
    "qdrant",
    "supabase",
    "neo4j",
    "langfuse",
    "redis",
    "minio",
    "clickhouse",
];

/// Node type segments that indicate local AI usage (local LLM chains,
/// agents, and embedding nodes).
const LOCAL_AI_SEGMENTS: &[&str] = &[
    "agent",
    "chainllm",
    "chainsummarization",
    "chainretrievalqa",
    "lmchatollama",
    "lmollama",
    "embeddingsollama",
];

/// Node type segments that are workflow plumbing rather than app
/// connectors. These never trigger the external-API flag.
const UTILITY_SEGMENTS: &[&str] = &[
    "set",
    "code",
    "function",
    "functionitem",
    "merge",
    "if",
    "switch",
    "filter",
    "router",
    "noop",
    "stickynote",
    "wait",
    "splitinbatches",
    "executeworkflow",
    "subworkflow",
    "webhook",
    "respondtowebhook",
    "schedule",
    "scheduletrigger",
    "cron",
    "crontrigger",
    "manualtrigger",
    "errortrigger",
    "itemlists",
    "datetime",
    "html",
    "markdown",
    "xml",
    "crypto",
    "httprequest",
    "memorybufferwindow",
    "outputparserstructured",
    "agent",
    "chainllm",
    "chainsummarization",
    "chainretrievalqa",
];

/// Control-flow segments that escalate difficulty one level: branching,
/// looping, and sub-workflow invocation. Short entries match exactly so
/// `if` cannot fire on unrelated integration names.
const CONTROL_FLOW_SEGMENTS: &[&str] = &[
    "if",
    "switch",
    "filter",
    "router",
    "loop",
    "splitinbatches",
    "executeworkflow",
    "subworkflow",
];

/// Difficulty thresholds on node count. Below the first bound is beginner,
/// below the second is intermediate, everything else advanced.
pub const DIFFICULTY_NODE_BOUNDS: (i64, i64) = (10, 25);

/// Category keyword tables, in priority order. Overlap against
/// (name + description + tags) picks the category; ties go to the earlier
/// entry; zero overlap everywhere falls back to Utilities & Tools.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::AiMachineLearning,
        &[
            "ai",
            "rag",
            "llm",
            "gpt",
            "agent",
            "langchain",
            "embedding",
            "retrieval",
            "summariz",
            "chatbot",
            "assistant",
            "machine learning",
        ],
    ),
    (
        Category::CommunicationMessaging,
        &[
            "email",
            "gmail",
            "slack",
            "telegram",
            "discord",
            "whatsapp",
            "chat",
            "messag",
            "notification",
        ],
    ),
    (
        Category::DataAnalytics,
        &[
            "data",
            "analytics",
            "database",
            "sql",
            "etl",
            "report",
            "scrape",
            "dashboard",
        ],
    ),
    (
        Category::BusinessProductivity,
        &[
            "business",
            "productivity",
            "automation",
            "workflow",
            "crm",
            "invoice",
            "calendar",
            "task",
        ],
    ),
    (Category::UtilitiesTools, &["utility", "tool", "backup", "convert"]),
];

/// Content-derived tag table: tag plus the keywords that earn it.
const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    ("ai", &["ai", "artificial intelligence", "machine learning"]),
    ("rag", &["rag", "retrieval", "augmented generation"]),
    ("automation", &["automation", "automate", "automatic"]),
    ("email", &["email", "gmail", "mail"]),
    ("chat", &["chat", "messaging", "conversation"]),
    ("document", &["document", "pdf", "file"]),
    ("data", &["data", "database", "sql"]),
    ("local", &["local", "offline", "self-hosted"]),
];

/// Use-case patterns; a use case applies when at least two of its
/// keywords appear in the workflow text.
const USE_CASE_PATTERNS: &[(&str, &[&str])] = &[
    ("Document Q&A", &["document", "q&a", "question", "answer"]),
    ("Email Automation", &["email", "gmail", "automate", "respond"]),
    ("Data Processing", &["data", "process", "transform", "etl"]),
    ("Chat Bot", &["chat", "bot", "conversation", "assistant"]),
    ("Content Generation", &["generate", "create", "content", "write"]),
    ("Research Assistant", &["research", "analyze", "summarize"]),
];

/// Extracts integration identity from node type identifiers.
///
/// The default implementation understands the two namespace shapes of the
/// workflow runtime (`vendor-nodes-base.slack`, `@vendor/pack.lmChatOllama`).
/// Implement this trait to teach the analyzer about additional node
/// packages without touching the parser.
pub trait NodeClassifier: Send + Sync {
    /// The lowercased integration segment of a node type, or `None` when
    /// the identifier has no namespace at all.
    fn integration(&self, node_type: &str) -> Option<String>;

    /// Whether the node type is generic workflow plumbing rather than an
    /// app connector.
    fn is_utility(&self, node_type: &str) -> bool;
}

/// Default classifier: the integration is the final dot-separated segment
/// of the node type, lowercased.
pub struct NamespaceClassifier;

/// Keyword test over lowercased text. Keywords of three characters or
/// fewer must match a whole word so `ai` cannot fire inside `email`.
fn keyword_hit(lower: &str, keyword: &str) -> bool {
    if keyword.len() > 3 || keyword.contains(' ') {
        lower.contains(keyword)
    } else {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    }
}

impl NodeClassifier for NamespaceClassifier {
    fn integration(&self, node_type: &str) -> Option<String> {
        // A bare identifier with no namespace carries no integration.
        if !node_type.contains('.') {
            return None;
        }
        let segment = node_type.rsplit('.').next().unwrap_or_default();
        if segment.is_empty() {
            return None;
        }
        Some(segment.to_lowercase())
    }

    fn is_utility(&self, node_type: &str) -> bool {
        match self.integration(node_type) {
            Some(seg) => UTILITY_SEGMENTS.contains(&seg.as_str()),
            None => true,
        }
    }
}

/// The rule tables bound to a concrete local-service catalog, passed into
/// the parser, scorer, and orchestrator as one explicit object.
pub struct RuleSet {
    local_services: Vec<String>,
    classifier: Box<dyn NodeClassifier>,
}

impl RuleSet {
    pub fn new(local_services: Vec<String>) -> RuleSet {
        RuleSet {
            local_services,
            classifier: Box::new(NamespaceClassifier),
        }
    }

    /// Replace the default namespace classifier.
    pub fn with_classifier(mut self, classifier: Box<dyn NodeClassifier>) -> RuleSet {
        self.classifier = classifier;
        self
    }

    pub fn local_services(&self) -> &[String] {
        &self.local_services
    }

    pub fn integration(&self, node_type: &str) -> Option<String> {
        self.classifier.integration(node_type)
    }

    /// The known local service referenced by `text`, if any. Matches by
    /// substring, so `postgresTool` and `postgresApi` both resolve to
    /// `postgres`.
    pub fn local_service_for(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.local_services
            .iter()
            .find(|svc| lower.contains(svc.as_str()))
            .map(|s| s.as_str())
    }

    /// A credential is local when its slot name references a known service.
    pub fn is_local_credential(&self, credential: &str) -> bool {
        self.local_service_for(credential).is_some()
    }

    /// Whether a node type is a third-party connector outside the known
    /// local-service catalog.
    pub fn is_external_connector(&self, node_type: &str) -> bool {
        if self.classifier.is_utility(node_type) {
            return false;
        }
        match self.classifier.integration(node_type) {
            Some(seg) => self.local_service_for(&seg).is_none(),
            None => false,
        }
    }

    pub fn is_local_ai(&self, node_type: &str) -> bool {
        match self.classifier.integration(node_type) {
            Some(seg) => LOCAL_AI_SEGMENTS.contains(&seg.as_str()),
            None => false,
        }
    }

    /// Branching, looping, or sub-workflow invocation node.
    pub fn is_control_flow(&self, node_type: &str) -> bool {
        let Some(seg) = self.classifier.integration(node_type) else {
            return false;
        };
        CONTROL_FLOW_SEGMENTS
            .iter()
            .any(|pat| seg == *pat || (pat.len() >= 4 && seg.starts_with(pat)))
    }

    /// Keyword-overlap categorization over the workflow's combined text.
    pub fn categorize(&self, text: &str) -> Category {
        let lower = text.to_lowercase();
        let mut best = Category::UtilitiesTools;
        let mut best_overlap = 0usize;
        for (category, keywords) in CATEGORY_KEYWORDS {
            let overlap = keywords
                .iter()
                .filter(|kw| keyword_hit(&lower, kw))
                .count();
            if overlap > best_overlap {
                best = *category;
                best_overlap = overlap;
            }
        }
        best
    }

    /// Tags earned by the workflow text, per the tag keyword table.
    pub fn tags_for_text(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        TAG_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| keyword_hit(&lower, kw)))
            .map(|(tag, _)| tag.to_string())
            .collect()
    }

    /// Use cases with at least two keyword hits in the workflow text.
    pub fn use_cases_for_text(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        USE_CASE_PATTERNS
            .iter()
            .filter(|(_, keywords)| {
                keywords.iter().filter(|kw| keyword_hit(&lower, kw)).count() >= 2
            })
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::new(
            DEFAULT_LOCAL_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}
