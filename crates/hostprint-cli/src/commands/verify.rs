//! `hostprint verify` - Phase 3.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use hostprint::config::{ScoringConfig, VerificationConfig};
use hostprint::discovery::CandidateHost;
use hostprint::export::{read_candidates, write_results_csv, write_verification_report};
use hostprint::fingerprint::{apply_weight_overrides, parse_weight_overrides, FingerprintFile};
use hostprint::util::app_slug;
use hostprint::verify::VerificationEngine;

#[derive(Args)]
pub struct VerifyArgs {
    /// Fingerprint file produced by Phase 1
    #[arg(short, long)]
    pub fingerprint: PathBuf,

    /// Candidates file produced by `discover`
    #[arg(short, long)]
    pub candidates: PathBuf,

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

    /// Retry with the alternate scheme / app prefix below this score
    #[arg(long, default_value_t = 50)]
    pub retry_threshold: u32,

    /// Probe weight overrides, e.g. "favicon:80,image:50" or "1:100,2:50"
    #[arg(long)]
    pub weights: Option<String>,

    /// Report path; defaults to output/exports/<app>_<run_id>_verified.json
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write a CSV next to the report
    #[arg(long)]
    pub csv: bool,
}

pub async fn execute(args: VerifyArgs) -> Result<()> {
    let fingerprint = FingerprintFile::load(&args.fingerprint)
        .with_context(|| format!("loading fingerprint {}", args.fingerprint.display()))?;
    let candidates = read_candidates(&args.candidates)
        .with_context(|| format!("loading candidates {}", args.candidates.display()))?;
    verify_candidates(&args, fingerprint, candidates).await
}

/// Shared verification flow, also used by `run`.
pub async fn verify_candidates(
    args: &VerifyArgs,
    mut fingerprint: FingerprintFile,
    candidates: Vec<CandidateHost>,
) -> Result<()> {
    if candidates.is_empty() {
        println!("[!] No candidates to verify");
        return Ok(());
    }

    if let Some(weights) = &args.weights {
        let overrides = parse_weight_overrides(weights);
        apply_weight_overrides(&mut fingerprint.probe_plan, &overrides);
        println!("[Weights] Applied overrides: {weights}");
    }

    let config = VerificationConfig::new()
        .with_workers(args.workers)
        .with_timeout_secs(args.timeout)
        .with_tcp_check(!args.no_tcp_check)
        .with_fetch_tls(!args.no_tls)
        .with_retry_threshold(args.retry_threshold);

    let engine = VerificationEngine::new(config, ScoringConfig::default());
    let report = engine.verify_candidates(&fingerprint, candidates).await?;

    println!("\n[Verification Summary]");
    println!("  Total:     {}", report.total_candidates);
    println!("  Verified:  {}", report.verified_count);
    println!("  Likely:    {}", report.likely_count);
    println!("  Partial:   {}", report.partial_count);
    println!("  Unlikely:  {}", report.unlikely_count);
    println!("  No match:  {}", report.no_match_count);
    if report.error_count > 0 {
        println!("  Errors:    {}", report.error_count);
    }

    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from("output").join("exports").join(format!(
            "{}_{}_verified.json",
            app_slug(&report.app_name),
            report.fingerprint_run_id
        ))
    });
    write_verification_report(&output, &report, true)?;
    println!("\n[✓] Report written to {}", output.display());

    if args.csv {
        let csv_path = output.with_extension("csv");
        write_results_csv(&csv_path, &report)?;
        println!("[✓] CSV written to {}", csv_path.display());
    }
    Ok(())
}
