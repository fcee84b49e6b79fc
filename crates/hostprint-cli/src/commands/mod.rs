//! Subcommand implementations.

pub mod cache;
pub mod discover;
pub mod plugins;
pub mod run;
pub mod verify;

use std::sync::Arc;

use anyhow::Result;
use hostprint::discovery::PluginRegistry;

/// Wire the bundled discovery plugins into the process-wide registry.
/// Registration is unconditional; unconfigured plugins stay listed but
/// are skipped at discovery time.
pub fn register_builtin_plugins() -> Result<()> {
    let registry = PluginRegistry::global();
    registry.register(Arc::new(hostprint_shodan::ShodanPlugin::from_env()))?;
    registry.register(Arc::new(hostprint_censys::CensysPlugin::from_env()))?;
    Ok(())
}
