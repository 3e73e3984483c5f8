use anyhow::Result;

use crate::config::Config;
use crate::provider::create_provider;

/// Print the configured source and the units it would yield.
pub async fn list_sources(config: &Config) -> Result<()> {
    let provider = create_provider(config)?;

    println!("{:<12} {}", "SOURCE", "NAME");
    println!("{:<12} {}", provider.source_label(), provider.name());
    println!();

    match provider.list().await {
        Ok(units) => {
            println!("{} unit(s) discovered:", units.len());
            for unit in &units {
                println!("  {}", unit.path);
            }
        }
        Err(e) => {
            println!("listing failed: {}", e);
        }
    }
    Ok(())
}
