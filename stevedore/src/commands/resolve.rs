//! The `resolve` subcommand.

use std::path::Path;

use libstevedore::{Result, StevedoreError};

/// Resolves a repository name and prints how the daemon would see it.
pub fn run(config_path: Option<&Path>, name: &str, json: bool) -> Result<()> {
    let service = super::load_service(config_path)?;
    let info = service.resolve_repository(name)?;

    if json {
        let value = serde_json::json!({
            "index_name": info.index.name,
            "index_secure": info.index.secure,
            "index_official": info.index.official,
            "remote_name": info.remote_name,
            "local_name": info.local_name,
            "canonical_name": info.canonical_name,
            "official": info.official,
        });
        let rendered = serde_json::to_string_pretty(&value)
            .map_err(|e| StevedoreError::validation_with_source("failed to render JSON", e))?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Index:          {}", info.index.name);
    println!("Index secure:   {}", info.index.secure);
    println!("Index official: {}", info.index.official);
    println!("Remote name:    {}", info.remote_name);
    println!("Local name:     {}", info.local_name);
    println!("Canonical name: {}", info.canonical_name);
    println!("Official repo:  {}", info.official);
    Ok(())
}
