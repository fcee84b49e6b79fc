//! `hostprint discover` - Phase 2.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use hostprint::config::{CacheStrategy, DiscoveryConfig};
use hostprint::discovery::{CandidateHost, DiscoveryEngine, PluginRegistry};
use hostprint::enrich::IpLookup;
use hostprint::export::write_candidates;
use hostprint::fingerprint::FingerprintFile;
use hostprint::prompt::{AutoPrompt, OperatorPrompt};
use hostprint::util::app_slug;
use hostprint_ipinfo::IpInfoClient;

use crate::prompt::TerminalPrompt;

#[derive(Args)]
pub struct DiscoverArgs {
    /// Fingerprint file produced by Phase 1
    #[arg(short, long)]
    pub fingerprint: PathBuf,

    /// Directory for the per-query cache
    #[arg(long, default_value = "output/cache")]
    pub cache_dir: PathBuf,

    /// Cache TTL in days (0 = never expire)
    #[arg(long, default_value_t = 7)]
    pub cache_ttl_days: u32,

    /// Cache strategy: cache-only, new-only, or cache-and-new
    #[arg(long, value_enum, default_value = "cache-and-new")]
    pub cache_strategy: CacheStrategyArg,

    /// Maximum queries generated from the fingerprint
    #[arg(long, default_value_t = 10)]
    pub max_queries: usize,

    /// Maximum candidates kept after deduplication
    #[arg(long)]
    pub max_candidates: Option<usize>,

    /// Only use these plugins (comma-separated names)
    #[arg(long, value_delimiter = ',')]
    pub plugins: Option<Vec<String>>,

    /// Skip IPInfo enrichment
    #[arg(long)]
    pub no_enrich: bool,

    /// Review each query before execution
    #[arg(short, long)]
    pub interactive: bool,

    /// Output path; defaults to output/candidates/<app>_<run_id>_candidates.json
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum CacheStrategyArg {
    CacheOnly,
    NewOnly,
    CacheAndNew,
}

impl From<CacheStrategyArg> for CacheStrategy {
    fn from(arg: CacheStrategyArg) -> Self {
        match arg {
            CacheStrategyArg::CacheOnly => CacheStrategy::CacheOnly,
            CacheStrategyArg::NewOnly => CacheStrategy::NewOnly,
            CacheStrategyArg::CacheAndNew => CacheStrategy::CacheAndNew,
        }
    }
}

pub async fn execute(args: DiscoverArgs) -> Result<()> {
    let fingerprint = FingerprintFile::load(&args.fingerprint)
        .with_context(|| format!("loading fingerprint {}", args.fingerprint.display()))?;
    let candidates = discover_candidates(&args, &fingerprint).await?;

    let run_id = fingerprint
        .fingerprint_spec
        .run_id
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let output = args.output.clone().unwrap_or_else(|| {
        default_candidates_path(&fingerprint.fingerprint_spec.app_name, &run_id)
    });
    write_candidates(&output, &run_id, &candidates)?;
    println!(
        "[✓] {} candidates written to {}",
        candidates.len(),
        output.display()
    );
    Ok(())
}

/// Shared discovery flow, also used by `run`.
pub async fn discover_candidates(
    args: &DiscoverArgs,
    fingerprint: &FingerprintFile,
) -> Result<Vec<CandidateHost>> {
    let config = DiscoveryConfig {
        cache_dir: args.cache_dir.clone(),
        cache_ttl_days: args.cache_ttl_days,
        cache_strategy: args.cache_strategy.into(),
        max_queries: args.max_queries,
        max_candidates: args.max_candidates,
        max_results_per_query: None,
        enrich: !args.no_enrich,
        enrich_workers: 20,
        enabled_plugins: args.plugins.clone(),
        interactive: args.interactive,
    };

    let enricher: Option<IpInfoClient> = if args.no_enrich {
        None
    } else {
        let client = IpInfoClient::from_env(args.cache_dir.join("ipinfo"))?;
        if client.is_configured() {
            Some(client)
        } else {
            println!("[Enrich] Skipped - IPINFO_TOKEN not set");
            None
        }
    };

    let prompt: Box<dyn OperatorPrompt> = if args.interactive {
        Box::new(TerminalPrompt)
    } else {
        Box::new(AutoPrompt)
    };

    let engine = DiscoveryEngine::new(config)?;
    let summary = engine
        .discover(
            &fingerprint.fingerprint_spec,
            PluginRegistry::global(),
            prompt.as_ref(),
            enricher.as_ref().map(|c| c as &dyn IpLookup),
        )
        .await?;

    println!(
        "[Cache] {} queries from cache, {} fresh API calls",
        summary.cached_queries, summary.fresh_queries
    );
    if summary.aborted {
        println!("[!] Discovery stopped early; results so far are kept");
    }
    Ok(summary.candidates)
}

fn default_candidates_path(app_name: &str, run_id: &str) -> PathBuf {
    PathBuf::from("output")
        .join("candidates")
        .join(format!("{}_{run_id}_candidates.json", app_slug(app_name)))
}
