//! Subcommand implementations.

use std::path::Path;

use libstevedore::config::ServiceOptions;
use libstevedore::{Result, Service, ServiceConfig};

pub mod ping;
pub mod resolve;
pub mod search;

/// Builds a service from an optional configuration file.
pub fn load_service(config_path: Option<&Path>) -> Result<Service> {
    let options = ServiceOptions::load(config_path)?;
    Service::new(ServiceConfig::new(&options)?)
}
