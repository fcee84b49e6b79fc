//! `hostprint cache` - query-cache maintenance.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use hostprint::discovery::QueryCacheStore;

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,

    /// Cache directory
    #[arg(long, global = true, default_value = "output/cache")]
    pub cache_dir: PathBuf,

    /// TTL used to decide what counts as expired
    #[arg(long, global = true, default_value_t = 7)]
    pub cache_ttl_days: u32,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Show cache statistics
    Stats,
    /// Delete cached queries
    Clear {
        /// Only delete entries past the TTL
        #[arg(long)]
        expired_only: bool,
    },
}

pub fn execute(args: CacheArgs) -> Result<()> {
    let store = QueryCacheStore::new(&args.cache_dir, args.cache_ttl_days)?;
    match args.command {
        CacheCommand::Stats => {
            let stats = store.stats();
            println!("Cached queries:   {}", stats.total_queries);
            println!("  valid:          {}", stats.valid_queries);
            println!("  expired:        {}", stats.expired_queries);
            println!("Total candidates: {}", stats.total_candidates);
            for (platform, count) in &stats.by_platform {
                println!("  {platform}: {count}");
            }
            if let Some(oldest) = &stats.oldest {
                println!("Oldest entry:     {oldest}");
            }
            if let Some(newest) = &stats.newest {
                println!("Newest entry:     {newest}");
            }
        }
        CacheCommand::Clear { expired_only } => {
            let (cleared, kept) = store.clear(expired_only);
            if expired_only {
                println!("[Cache] Cleared {cleared} expired queries, kept {kept} valid");
            } else {
                println!("[Cache] Cleared {cleared} cached queries");
            }
        }
    }
    Ok(())
}
