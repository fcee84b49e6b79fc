//! `hostprint plugins` - list discovery plugins.

use anyhow::Result;
use clap::Args;
use hostprint::discovery::PluginRegistry;

#[derive(Args)]
pub struct PluginsArgs {
    /// Only show plugins with credentials present
    #[arg(long)]
    pub configured: bool,
}

pub fn execute(args: PluginsArgs) -> Result<()> {
    let registry = PluginRegistry::global();
    let plugins = if args.configured {
        registry.configured_plugins()
    } else {
        registry.instances()
    };

    if plugins.is_empty() {
        println!("No discovery plugins registered");
        return Ok(());
    }

    println!("{:<12} {:<12} DESCRIPTION", "NAME", "CONFIGURED");
    for plugin in plugins {
        println!(
            "{:<12} {:<12} {}",
            plugin.name(),
            if plugin.is_configured() { "yes" } else { "no" },
            plugin.description()
        );
        let types: Vec<&str> = plugin
            .supported_query_types()
            .iter()
            .map(|t| t.wire_name())
            .collect();
        println!("{:<12} {:<12}   query types: {}", "", "", types.join(", "));
    }
    Ok(())
}
