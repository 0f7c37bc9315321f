use anyhow::Result;

use crate::config::Config;

/// Print the configured sources and a cheap health verdict for each.
pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<16} {:<10} {:<40} HEALTHY", "SOURCE", "KIND", "LOCATION");

    if config.sources.is_empty() {
        println!("(no sources configured)");
        return Ok(());
    }

    for source in &config.sources {
        let (location, healthy) = match source.kind.as_str() {
            "github" => {
                let repo = source.repo.as_deref().unwrap_or("(missing repo)");
                (format!("{}@{}", repo, source.branch), source.repo.is_some())
            }
            "directory" => match &source.root {
                Some(root) => (root.display().to_string(), root.exists()),
                None => ("(missing root)".to_string(), false),
            },
            other => (format!("(unknown kind '{}')", other), false),
        };

        println!(
            "{:<16} {:<10} {:<40} {}",
            source.name, source.kind, location, healthy
        );
    }

    Ok(())
}
