//! Workflow document parsing and analysis.
//!
//! [`parse`] validates the raw JSON into a [`ParsedWorkflow`] node graph;
//! [`analyze`] derives the catalog facts (integrations, services,
//! credentials, category, difficulty) from it using the rule tables.
//!
//! Parsing never aborts a batch: every failure is a [`ParseError`] carrying
//! the reason, recorded per entry by the orchestrator.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

use crate::error::ParseError;
use crate::models::{Difficulty, ParsedWorkflow, WorkflowAnalysis, WorkflowNode};
use crate::rules::{RuleSet, DIFFICULTY_NODE_BOUNDS};

/// Validate raw bytes into a workflow node graph.
pub fn parse(raw: &[u8]) -> Result<ParsedWorkflow, ParseError> {
    let doc: Value = serde_json::from_slice(raw)
        .map_err(|e| ParseError::MalformedJson(e.to_string()))?;

    let obj = doc
        .as_object()
        .ok_or_else(|| ParseError::InvalidNodeGraph("top-level value is not an object".into()))?;

    let nodes_val = obj
        .get("nodes")
        .ok_or_else(|| ParseError::MissingRequiredField("nodes".into()))?;
    let connections_val = obj
        .get("connections")
        .ok_or_else(|| ParseError::MissingRequiredField("connections".into()))?;

    let nodes_arr = nodes_val
        .as_array()
        .ok_or_else(|| ParseError::InvalidNodeGraph("'nodes' is not an array".into()))?;
    let connections = connections_val
        .as_object()
        .ok_or_else(|| ParseError::InvalidNodeGraph("'connections' is not an object".into()))?;

    let mut nodes = Vec::with_capacity(nodes_arr.len());
    let mut seen_ids = HashSet::new();
    // Connection endpoints may reference either a node's id or its
    // display name; accept both.
    let mut known_refs = HashSet::new();

    for (index, node_val) in nodes_arr.iter().enumerate() {
        let node_obj = node_val.as_object().ok_or_else(|| {
            ParseError::InvalidNodeGraph(format!("node {} is not an object", index))
        })?;

        let id = node_obj
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| node_obj.get("name").and_then(Value::as_str))
            .ok_or_else(|| {
                ParseError::InvalidNodeGraph(format!("node {} has no id", index))
            })?
            .to_string();

        if !seen_ids.insert(id.clone()) {
            return Err(ParseError::InvalidNodeGraph(format!(
                "duplicate node id '{}'",
                id
            )));
        }
        known_refs.insert(id.clone());
        if let Some(name) = node_obj.get("name").and_then(Value::as_str) {
            known_refs.insert(name.to_string());
        }

        let node_type = node_obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ParseError::InvalidNodeGraph(format!("node '{}' has no type", id))
            })?
            .to_string();

        let parameters = node_obj
            .get("parameters")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        let credentials = match node_obj.get("credentials") {
            Some(Value::Object(map)) => map.keys().map(|k| k.to_lowercase()).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ParseError::InvalidNodeGraph(format!(
                    "node '{}' credentials is not an object",
                    id
                )))
            }
        };

        nodes.push(WorkflowNode {
            id,
            node_type,
            parameters,
            credentials,
        });
    }

    validate_connections(connections, &known_refs)?;

    let name = obj.get("name").and_then(Value::as_str).map(str::to_string);
    let description = extract_description(obj, nodes_arr);
    let declared_tags = extract_declared_tags(obj.get("tags"));

    Ok(ParsedWorkflow {
        name,
        description,
        declared_tags,
        nodes,
    })
}

/// Every connection endpoint must reference an existing node id.
fn validate_connections(
    connections: &serde_json::Map<String, Value>,
    known: &HashSet<String>,
) -> Result<(), ParseError> {
    for (from, targets) in connections {
        if !known.contains(from) {
            return Err(ParseError::InvalidNodeGraph(format!(
                "connection source '{}' is not a node",
                from
            )));
        }
        check_targets(targets, known)?;
    }
    Ok(())
}

/// Walk nested connection structures collecting `node` references.
fn check_targets(value: &Value, known: &HashSet<String>) -> Result<(), ParseError> {
    match value {
        Value::Array(items) => {
            for item in items {
                check_targets(item, known)?;
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("node") {
                if !known.contains(target) {
                    return Err(ParseError::InvalidNodeGraph(format!(
                        "connection target '{}' is not a node",
                        target
                    )));
                }
            }
            for nested in map.values() {
                check_targets(nested, known)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Description from the document itself, falling back to the first sticky
/// note long enough to be prose.
fn extract_description(
    obj: &serde_json::Map<String, Value>,
    nodes: &[Value],
) -> Option<String> {
    if let Some(desc) = obj.get("description").and_then(Value::as_str) {
        if !desc.is_empty() {
            return Some(desc.to_string());
        }
    }

    for node in nodes {
        let is_sticky = node
            .get("type")
            .and_then(Value::as_str)
            .map(|t| t.to_lowercase().ends_with("stickynote"))
            .unwrap_or(false);
        if !is_sticky {
            continue;
        }
        if let Some(content) = node
            .pointer("/parameters/content")
            .and_then(Value::as_str)
        {
            if content.len() > 20 {
                return Some(content.chars().take(500).collect());
            }
        }
    }

    None
}

/// Declared tags may be plain strings or `{name}` objects.
fn extract_declared_tags(tags: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = tags else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|t| match t {
            Value::String(s) => Some(s.to_lowercase()),
            Value::Object(map) => map
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_lowercase),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Derive the catalog facts from a parsed workflow.
pub fn analyze(parsed: &ParsedWorkflow, rules: &RuleSet) -> WorkflowAnalysis {
    let mut node_types = BTreeSet::new();
    let mut integrations = BTreeSet::new();
    let mut credentials = BTreeSet::new();
    let mut services = BTreeSet::new();
    let mut external_api_flag = false;
    let mut has_webhook = false;
    let mut has_schedule = false;
    let mut has_control_flow = false;

    for node in &parsed.nodes {
        let lower_type = node.node_type.to_lowercase();
        node_types.insert(node.node_type.clone());

        if lower_type.contains("webhook") {
            has_webhook = true;
        }
        if lower_type.contains("schedule") || lower_type.contains("cron") {
            has_schedule = true;
        }
        if rules.is_control_flow(&node.node_type) {
            has_control_flow = true;
        }
        if rules.is_external_connector(&node.node_type) {
            external_api_flag = true;
        }
        if let Some(integration) = rules.integration(&node.node_type) {
            integrations.insert(integration);
        }
        if let Some(service) = rules.local_service_for(&node.node_type) {
            services.insert(service.to_string());
        }
        for cred in &node.credentials {
            credentials.insert(cred.clone());
            if let Some(service) = rules.local_service_for(cred) {
                services.insert(service.to_string());
            }
        }
    }

    let node_count = parsed.nodes.len() as i64;
    let difficulty = derive_difficulty(node_count, has_control_flow);

    let text = combined_text(parsed);
    let category = rules.categorize(&text);

    let mut tags: BTreeSet<String> = parsed.declared_tags.iter().cloned().collect();
    tags.extend(rules.tags_for_text(&text));
    tags.extend(integrations.iter().take(5).cloned());
    let tags: Vec<String> = tags.into_iter().take(10).collect();

    let use_cases: Vec<String> = rules.use_cases_for_text(&text).into_iter().take(3).collect();

    WorkflowAnalysis {
        node_count,
        node_types: node_types.into_iter().collect(),
        integrations: integrations.into_iter().collect(),
        required_credentials: credentials.into_iter().collect(),
        required_services: services.into_iter().collect(),
        external_api_flag,
        has_webhook,
        has_schedule,
        category,
        difficulty,
        tags,
        use_cases,
    }
}

/// Node-count thresholds, escalated one level when the graph branches,
/// loops, or invokes sub-workflows.
fn derive_difficulty(node_count: i64, has_control_flow: bool) -> Difficulty {
    let (beginner_max, intermediate_max) = DIFFICULTY_NODE_BOUNDS;
    let base = if node_count < beginner_max {
        Difficulty::Beginner
    } else if node_count < intermediate_max {
        Difficulty::Intermediate
    } else {
        Difficulty::Advanced
    };
    if has_control_flow {
        base.escalate()
    } else {
        base
    }
}

/// The searchable text a workflow is classified on.
fn combined_text(parsed: &ParsedWorkflow) -> String {
    let mut text = String::new();
    if let Some(name) = &parsed.name {
        text.push_str(name);
        text.push(' ');
    }
    if let Some(desc) = &parsed.description {
        text.push_str(desc);
        text.push(' ');
    }
    for tag in &parsed.declared_tags {
        text.push_str(tag);
        text.push(' ');
    }
    text
}
