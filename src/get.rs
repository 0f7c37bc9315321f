use anyhow::Result;

use crate::error::StoreError;
use crate::store::CatalogStore;

/// CLI get: print one catalog record in full.
pub async fn run_get(store: &CatalogStore, id: &str) -> Result<()> {
    let record = match store.get_by_id(id).await {
        Ok(record) => record,
        Err(StoreError::NotFound(id)) => anyhow::bail!("Workflow not found: {}", id),
        Err(e) => return Err(e.into()),
    };

    println!("Workflow {}", record.id);
    println!("  name:        {}", record.name);
    if let Some(description) = &record.description {
        println!("  description: {}", description.replace('\n', " "));
    }
    println!("  source:      {} / {}", record.repository, record.path);
    println!("  revision:    {}", record.revision);

    if let Some(reason) = &record.parse_failure {
        println!("  parse failure: {}", reason);
        return Ok(());
    }

    println!("  category:    {}", record.category.as_str());
    println!("  difficulty:  {}", record.difficulty.as_str());
    println!(
        "  score:       {:.2} ({})",
        record.compatibility_score,
        record.compatibility_status.as_str()
    );
    println!("  local AI:    {}", record.local_ai);
    println!("  nodes:       {}", record.node_count);
    if !record.integrations.is_empty() {
        println!("  integrations: {}", record.integrations.join(", "));
    }
    if !record.required_services.is_empty() {
        println!("  services:    {}", record.required_services.join(", "));
    }
    if !record.required_credentials.is_empty() {
        println!("  credentials: {}", record.required_credentials.join(", "));
    }
    if !record.tags.is_empty() {
        println!("  tags:        {}", record.tags.join(", "));
    }
    if !record.use_cases.is_empty() {
        println!("  use cases:   {}", record.use_cases.join(", "));
    }

    Ok(())
}
