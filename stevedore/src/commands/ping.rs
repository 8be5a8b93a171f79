//! The `ping` subcommand.

use std::path::Path;

use libstevedore::endpoint::{Endpoint, new_http_client};
use libstevedore::Result;

/// Probes a registry endpoint and prints what it advertised.
pub async fn run(config_path: Option<&Path>, address: &str) -> Result<()> {
    let service = super::load_service(config_path)?;
    let index = service.resolve_index(address)?;

    let http_client = new_http_client(30)?;
    let endpoint = Endpoint::resolve(&index, &http_client).await?;
    let result = endpoint.ping(&http_client).await?;

    println!("Endpoint:   {}", endpoint);
    println!("Secure:     {}", endpoint.is_secure);
    println!("Standalone: {}", result.standalone);
    match result.version {
        Some(version) => println!("Version:    {}", version),
        None => println!("Version:    (not advertised)"),
    }
    Ok(())
}
