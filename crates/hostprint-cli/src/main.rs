// Allow clippy warnings for CLI application
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod prompt;

use commands::{cache, discover, plugins, run, verify};

/// HostPrint CLI - find deployments of a known web application
///
/// Phase 1 (fingerprint synthesis) happens elsewhere; this binary drives
/// the pipeline from an existing fingerprint file:
///
///   discover  - Phase 2: query discovery sources into a candidates file
///   verify    - Phase 3: probe candidates and write a scored report
///   run       - discover + verify in one go
///   plugins   - list discovery plugins and their configuration state
///   cache     - inspect or clear the per-query discovery cache
#[derive(Parser)]
#[command(name = "hostprint")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fingerprint-driven discovery and verification of exposed web applications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (equivalent to RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run passive discovery from a fingerprint file
    Discover(discover::DiscoverArgs),

    /// Verify candidates against a fingerprint's probe plan
    Verify(verify::VerifyArgs),

    /// Run discovery and verification back to back
    Run(run::RunArgs),

    /// List discovery plugins
    Plugins(plugins::PluginsArgs),

    /// Inspect or clear the query cache
    Cache(cache::CacheArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    commands::register_builtin_plugins()?;

    match cli.command {
        Commands::Discover(args) => discover::execute(args).await,
        Commands::Verify(args) => verify::execute(args).await,
        Commands::Run(args) => run::execute(args).await,
        Commands::Plugins(args) => plugins::execute(args),
        Commands::Cache(args) => cache::execute(args),
    }
}
