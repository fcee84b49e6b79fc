//! `hostprint run` - discovery and verification back to back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use hostprint::export::write_candidates;
use hostprint::fingerprint::FingerprintFile;
use hostprint::util::app_slug;

use super::{discover, verify};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub discover: discover::DiscoverArgs,

    /// Concurrent verification workers
    #[arg(long, default_value_t = 10)]
    pub workers: usize,

    /// HTTP timeout per probe, in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Skip the TCP liveness check
    #[arg(long)]
    pub no_tcp_check: bool,

    /// Skip TLS certificate harvesting
    #[arg(long)]
    pub no_tls: bool,

    /// Probe weight overrides, e.g. "favicon:80,image:50"
    #[arg(long)]
    pub weights: Option<String>,

    /// Also write a CSV next to the report
    #[arg(long)]
    pub csv: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let fingerprint = FingerprintFile::load(&args.discover.fingerprint).with_context(|| {
        format!("loading fingerprint {}", args.discover.fingerprint.display())
    })?;
    let run_id = fingerprint
        .fingerprint_spec
        .run_id
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let slug = app_slug(&fingerprint.fingerprint_spec.app_name);

    // Phase 2
    let candidates = discover::discover_candidates(&args.discover, &fingerprint).await?;
    let candidates_path = args.discover.output.clone().unwrap_or_else(|| {
        PathBuf::from("output")
            .join("candidates")
            .join(format!("{slug}_{run_id}_candidates.json"))
    });
    write_candidates(&candidates_path, &run_id, &candidates)?;
    println!(
        "[✓] {} candidates written to {}",
        candidates.len(),
        candidates_path.display()
    );

    // Phase 3
    let verify_args = verify::VerifyArgs {
        fingerprint: args.discover.fingerprint.clone(),
        candidates: candidates_path,
        workers: args.workers,
        timeout: args.timeout,
        no_tcp_check: args.no_tcp_check,
        no_tls: args.no_tls,
        retry_threshold: 50,
        weights: args.weights.clone(),
        output: None,
        csv: args.csv,
    };
    verify::verify_candidates(&verify_args, fingerprint, candidates).await
}
