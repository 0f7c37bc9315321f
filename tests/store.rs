//! Store-level properties: pagination stability, search correctness,
//! index consistency, and bulk re-scoring.

use std::collections::HashSet;

use tempfile::TempDir;

use workflow_catalog::db;
use workflow_catalog::error::StoreError;
use workflow_catalog::migrate;
use workflow_catalog::models::{
    Category, CompatibilityStatus, Difficulty, WorkflowRecord,
};
use workflow_catalog::rules::RuleSet;
use workflow_catalog::score::SCORER_VERSION;
use workflow_catalog::store::{CatalogStore, QueryFilters};

async fn open_store() -> (TempDir, CatalogStore) {
    let tmp = tempfile::tempdir().unwrap();
    let pool = db::connect_path(&tmp.path().join("catalog.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, CatalogStore::new(pool))
}

fn make_record(i: usize) -> WorkflowRecord {
    WorkflowRecord {
        id: format!("{:016x}", i),
        name: format!("workflow {:02}", i),
        description: Some(format!("test workflow number {}", i)),
        tags: vec!["test".to_string()],
        use_cases: Vec::new(),
        repository: "org/repo".to_string(),
        path: format!("flows/wf{:02}.json", i),
        revision: "abc123".to_string(),
        content_hash: format!("hash{}", i),
        source_url: None,
        author: Some("org".to_string()),
        node_count: 3,
        node_types: vec!["vendor-nodes-base.set".to_string()],
        integrations: Vec::new(),
        required_credentials: Vec::new(),
        required_services: Vec::new(),
        external_api_flag: false,
        has_webhook: false,
        has_schedule: false,
        category: Category::UtilitiesTools,
        difficulty: Difficulty::Beginner,
        local_ai: i % 2 == 0,
        compatibility_score: 0.8,
        compatibility_status: CompatibilityStatus::PartiallyCompatible,
        popularity_score: (i / 5) as f64,
        ingested_at: 1_700_000_000,
        scorer_version: SCORER_VERSION,
        parse_failure: None,
    }
}

#[tokio::test]
async fn pagination_is_stable_without_overlap_or_gap() {
    let (_tmp, store) = open_store().await;

    for i in 0..25 {
        store.upsert(&make_record(i)).await.unwrap();
    }

    let filters = QueryFilters::default();
    let page1 = store.query(&filters, 1, 10).await.unwrap();
    let page2 = store.query(&filters, 2, 10).await.unwrap();
    let page3 = store.query(&filters, 3, 10).await.unwrap();

    assert_eq!(page1.workflows.len(), 10);
    assert_eq!(page2.workflows.len(), 10);
    assert_eq!(page3.workflows.len(), 5);
    assert_eq!(page1.total, 25);
    assert_eq!(page3.total, 25);

    let mut seen = HashSet::new();
    for record in page1
        .workflows
        .iter()
        .chain(&page2.workflows)
        .chain(&page3.workflows)
    {
        assert!(seen.insert(record.id.clone()), "duplicate id {}", record.id);
    }
    assert_eq!(seen.len(), 25);
}

#[tokio::test]
async fn default_ordering_is_popularity_then_name() {
    let (_tmp, store) = open_store().await;

    for i in 0..10 {
        store.upsert(&make_record(i)).await.unwrap();
    }

    let page = store.query(&QueryFilters::default(), 1, 10).await.unwrap();
    let pairs: Vec<(f64, String)> = page
        .workflows
        .iter()
        .map(|r| (r.popularity_score, r.name.clone()))
        .collect();

    let mut sorted = pairs.clone();
    sorted.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap()
            .then_with(|| a.1.cmp(&b.1))
    });
    assert_eq!(pairs, sorted);
}

#[tokio::test]
async fn search_respects_local_ai_filter_and_case() {
    let (_tmp, store) = open_store().await;

    let mut support = make_record(1);
    support.name = "Customer Support Chatbot".to_string();
    support.local_ai = true;
    store.upsert(&support).await.unwrap();

    let mut digest = make_record(2);
    digest.name = "Chatbot Analytics Digest".to_string();
    digest.local_ai = false;
    store.upsert(&digest).await.unwrap();

    let mut invoices = make_record(3);
    invoices.name = "Invoice Sync".to_string();
    invoices.local_ai = true;
    store.upsert(&invoices).await.unwrap();

    let filters = QueryFilters {
        local_ai_only: true,
        ..Default::default()
    };
    let page = store.search("chatbot", &filters, 1, 20).await.unwrap();
    assert_eq!(page.workflows.len(), 1);
    assert_eq!(page.workflows[0].name, "Customer Support Chatbot");
    assert!(page.workflows[0].local_ai);

    // Case-insensitive and prefix-matching
    let page = store
        .search("ChatBot", &QueryFilters::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(page.workflows.len(), 2);
}

#[tokio::test]
async fn search_tokens_match_description_and_tags() {
    let (_tmp, store) = open_store().await;

    let mut record = make_record(1);
    record.name = "Nightly Archiver".to_string();
    record.description = Some("Moves invoices into cold storage".to_string());
    record.tags = vec!["finance".to_string()];
    store.upsert(&record).await.unwrap();

    let page = store
        .search("invoices", &QueryFilters::default(), 1, 10)
        .await
        .unwrap();
    assert_eq!(page.workflows.len(), 1);

    let page = store
        .search("finance", &QueryFilters::default(), 1, 10)
        .await
        .unwrap();
    assert_eq!(page.workflows.len(), 1);

    let page = store
        .search("nonexistenttoken", &QueryFilters::default(), 1, 10)
        .await
        .unwrap();
    assert!(page.workflows.is_empty());
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn upsert_updates_record_and_index_together() {
    let (_tmp, store) = open_store().await;

    let mut record = make_record(1);
    record.name = "Alpha Flow".to_string();
    store.upsert(&record).await.unwrap();

    record.name = "Beta Flow".to_string();
    record.content_hash = "hash-v2".to_string();
    store.upsert(&record).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let loaded = store.get_by_id(&record.id).await.unwrap();
    assert_eq!(loaded.name, "Beta Flow");
    assert_eq!(loaded.content_hash, "hash-v2");

    // The index must shadow the record: the old name is gone, the new
    // one is searchable.
    let old = store
        .search("alpha", &QueryFilters::default(), 1, 10)
        .await
        .unwrap();
    assert!(old.workflows.is_empty());
    let new = store
        .search("beta", &QueryFilters::default(), 1, 10)
        .await
        .unwrap();
    assert_eq!(new.workflows.len(), 1);
}

#[tokio::test]
async fn parse_failure_records_are_stored_but_not_listed() {
    let (_tmp, store) = open_store().await;

    store.upsert(&make_record(1)).await.unwrap();

    let failed = WorkflowRecord::failed(
        "fail0000fail0000".to_string(),
        "org/repo".to_string(),
        "flows/broken.json".to_string(),
        "abc123".to_string(),
        "hash-broken".to_string(),
        "malformed_json: expected value at line 1".to_string(),
        1_700_000_000,
    );
    store.upsert(&failed).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.failure_count().await.unwrap(), 1);

    let page = store.query(&QueryFilters::default(), 1, 10).await.unwrap();
    assert_eq!(page.workflows.len(), 1);
    assert!(page.workflows[0].parse_failure.is_none());

    let page = store
        .search("broken", &QueryFilters::default(), 1, 10)
        .await
        .unwrap();
    assert!(page.workflows.is_empty());

    let loaded = store.get_by_id("fail0000fail0000").await.unwrap();
    assert!(loaded.parse_failure.is_some());
    assert_eq!(loaded.node_count, 0);
}

#[tokio::test]
async fn failure_overwriting_analyzed_record_clears_index_row() {
    let (_tmp, store) = open_store().await;

    let mut record = make_record(1);
    record.name = "Searchable Flow".to_string();
    store.upsert(&record).await.unwrap();

    let failed = WorkflowRecord::failed(
        record.id.clone(),
        record.repository.clone(),
        record.path.clone(),
        "def456".to_string(),
        "hash-broken".to_string(),
        "malformed_json: truncated".to_string(),
        1_700_000_001,
    );
    store.upsert(&failed).await.unwrap();

    let page = store
        .search("searchable", &QueryFilters::default(), 1, 10)
        .await
        .unwrap();
    assert!(page.workflows.is_empty());
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.failure_count().await.unwrap(), 1);
}

#[tokio::test]
async fn get_by_id_not_found() {
    let (_tmp, store) = open_store().await;

    let err = store.get_by_id("0000000000000000").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn tags_filter_matches_stored_tags() {
    let (_tmp, store) = open_store().await;

    let mut tagged = make_record(1);
    tagged.tags = vec!["email".to_string(), "automation".to_string()];
    store.upsert(&tagged).await.unwrap();

    let mut other = make_record(2);
    other.tags = vec!["data".to_string()];
    store.upsert(&other).await.unwrap();

    let filters = QueryFilters {
        tags: vec!["email".to_string()],
        ..Default::default()
    };
    let page = store.query(&filters, 1, 10).await.unwrap();
    assert_eq!(page.workflows.len(), 1);
    assert_eq!(page.workflows[0].id, tagged.id);
}

#[tokio::test]
async fn rescore_updates_stale_records_without_touching_analysis() {
    let (_tmp, store) = open_store().await;

    // A record scored by an older scorer version, with facts that the
    // current scorer maps to a perfect local-AI score.
    let mut stale = make_record(1);
    stale.node_types = vec!["@vendor/nodes-lang.lmChatOllama".to_string()];
    stale.required_credentials = vec!["ollamaapi".to_string()];
    stale.external_api_flag = false;
    stale.local_ai = false;
    stale.compatibility_score = 0.42;
    stale.compatibility_status = CompatibilityStatus::RequiresExternal;
    stale.scorer_version = SCORER_VERSION - 1;
    store.upsert(&stale).await.unwrap();

    // A record already at the current version stays untouched.
    let current = make_record(2);
    store.upsert(&current).await.unwrap();

    let rules = RuleSet::default();
    let updated = store.rescore_all(&rules).await.unwrap();
    assert_eq!(updated, 1);

    let loaded = store.get_by_id(&stale.id).await.unwrap();
    assert_eq!(loaded.scorer_version, SCORER_VERSION);
    assert!(loaded.local_ai);
    assert_eq!(loaded.compatibility_score, 1.0);
    assert_eq!(
        loaded.compatibility_status,
        CompatibilityStatus::FullyCompatible
    );
    // Analysis facts are untouched by a rescore.
    assert_eq!(loaded.node_types, stale.node_types);
    assert_eq!(loaded.node_count, stale.node_count);

    // Second rescore finds nothing stale.
    assert_eq!(store.rescore_all(&rules).await.unwrap(), 0);
}
