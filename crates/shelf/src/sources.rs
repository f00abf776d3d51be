use anyhow::Result;

use crate::config::{self, Config, SourceKind};

pub fn list_sources(config: &Config) -> Result<()> {
    if config.sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<8} {:<12} {:>5} {:>6}  {}",
        "SOURCE", "KIND", "STORE", "SIZE", "LIMIT", "TABLE"
    );
    for (name, source) in &config.sources {
        let store = match source.store {
            config::StoreMode::Raw => "raw",
            config::StoreMode::Transformed => "transformed",
        };
        let limit = source
            .page_limit()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<8} {:<12} {:>5} {:>6}  {}",
            name,
            source.kind.as_str(),
            store,
            source.page_size,
            limit,
            config::table_name(name)
        );
        if source.kind == SourceKind::Html {
            if let Some(listing) = &source.listing_url {
                println!("{:<16} listing: {}", "", listing);
            }
        }
    }

    Ok(())
}
