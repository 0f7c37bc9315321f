use anyhow::{bail, Result};

use crate::models::{Category, Difficulty};
use crate::store::{CatalogStore, QueryFilters};

/// CLI search: ranked full-text query against the catalog.
pub async fn run_search(
    store: &CatalogStore,
    query: &str,
    category: Option<String>,
    difficulty: Option<String>,
    local_ai_only: bool,
    limit: Option<u32>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let category = match category {
        Some(c) => Some(
            Category::parse(&c).ok_or_else(|| anyhow::anyhow!("Unknown category: '{}'", c))?,
        ),
        None => None,
    };
    let difficulty = match difficulty {
        Some(d) => match Difficulty::parse(&d) {
            Some(d) => Some(d),
            None => bail!("Unknown difficulty: '{}'. Use beginner, intermediate, or advanced.", d),
        },
        None => None,
    };

    let filters = QueryFilters {
        category,
        difficulty,
        local_ai_only,
        tags: Vec::new(),
    };

    let page = store.search(query, &filters, 1, limit.unwrap_or(12)).await?;

    if page.workflows.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, record) in page.workflows.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({}, {})",
            i + 1,
            record.compatibility_score,
            record.name,
            record.category.as_str(),
            record.difficulty.as_str()
        );
        println!("    status: {}", record.compatibility_status.as_str());
        if !record.required_services.is_empty() {
            println!("    services: {}", record.required_services.join(", "));
        }
        if let Some(url) = &record.source_url {
            println!("    url: {}", url);
        }
        println!("    id: {}", record.id);
        println!();
    }

    Ok(())
}
