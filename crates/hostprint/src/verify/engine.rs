//! The verification engine: drives probe plans over the candidate set.
//!
//! Candidates fan out across a bounded worker pool; within one candidate
//! the probes run strictly in plan order, because early termination
//! depends on the running score. The retry ladder per candidate is
//! deterministic (round A on the port-derived scheme, an alternate-scheme
//! round below the retry threshold, then prefix rounds), so identical
//! network responses always produce an identical verdict.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::prefix::derive_app_prefix;
use super::probe::ProbeExecutor;
use super::result::{Classification, ProbeResult, Scheme, VerificationReport, VerificationResult};
use super::tls::TlsClient;
use crate::config::{ScoringConfig, VerificationConfig};
use crate::discovery::CandidateHost;
use crate::error::Result;
use crate::fingerprint::{CheckType, FingerprintFile, FingerprintMode, ProbePlan};
use crate::util::{truncate_chars, utc_now_iso};

/// Phase 3 engine: candidates in, score-ranked verdicts out.
pub struct VerificationEngine {
    config: VerificationConfig,
    scoring: ScoringConfig,
}

impl VerificationEngine {
    /// Create an engine from configuration.
    #[must_use]
    pub fn new(config: VerificationConfig, scoring: ScoringConfig) -> Self {
        Self { config, scoring }
    }

    /// Verify every candidate against the fingerprint's probe plan.
    ///
    /// Every candidate produces a result, dead hosts and worker failures
    /// included; a single candidate can never abort the run.
    pub async fn verify_candidates(
        &self,
        fingerprint: &FingerprintFile,
        candidates: Vec<CandidateHost>,
    ) -> Result<VerificationReport> {
        let spec = &fingerprint.fingerprint_spec;
        let mut report = VerificationReport::new(
            spec.run_id.clone().unwrap_or_else(|| "unknown".to_string()),
            spec.app_name.clone(),
        );
        let started = Instant::now();

        // The prefix fallback only makes sense for a specific application;
        // an organization's sites share a brand, not a context path.
        let app_prefix = match spec.mode {
            FingerprintMode::Application => derive_app_prefix(&spec.app_name),
            FingerprintMode::Organization => None,
        };

        let executor = Arc::new(ProbeExecutor::new(
            &self.config,
            self.scoring.clone(),
            spec.mode,
        )?);
        let plan = Arc::new(fingerprint.probe_plan.clone());

        info!(
            app_name = %spec.app_name,
            candidates = candidates.len(),
            probe_steps = plan.probe_steps.len(),
            workers = self.config.workers,
            tcp_check = self.config.tcp_check,
            app_prefix = app_prefix.as_deref().unwrap_or(""),
            "starting active verification"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut handles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let engine_config = self.config.clone();
            let scoring = self.scoring.clone();
            let executor = Arc::clone(&executor);
            let plan = Arc::clone(&plan);
            let prefix = app_prefix.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push((
                candidate.clone(),
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    verify_single_candidate(
                        &engine_config,
                        &scoring,
                        executor.as_ref(),
                        plan.as_ref(),
                        prefix.as_deref(),
                        &candidate,
                    )
                    .await
                }),
            ));
        }

        for (candidate, handle) in handles {
            match handle.await {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    // A worker died; record the candidate instead of
                    // dropping it from the report.
                    warn!(ip = %candidate.ip, port = candidate.port, error = %e, "verification worker failed");
                    let mut result =
                        VerificationResult::for_candidate(&candidate, Scheme::Unknown);
                    let mut probe = ProbeResult::pending(0, CheckType::FaviconHash, "/");
                    probe.error = Some(truncate_chars(
                        &format!("Verification failed: {e}"),
                        100,
                    ));
                    result.probe_results.push(probe);
                    result.finalize_score(&self.scoring);
                    report.results.push(result);
                }
            }
        }

        report.calculate_summary();

        if self.config.fetch_tls {
            self.harvest_tls(&mut report).await;
        }

        report.verification_completed = Some(utc_now_iso());
        report.total_duration_ms = Some(started.elapsed().as_millis() as u64);

        info!(
            total = report.total_candidates,
            verified = report.verified_count,
            likely = report.likely_count,
            partial = report.partial_count,
            unlikely = report.unlikely_count,
            no_match = report.no_match_count,
            errors = report.error_count,
            duration_ms = report.total_duration_ms,
            "verification complete"
        );
        Ok(report)
    }

    /// Collect certificates for every verified/likely result.
    ///
    /// Port 80/443 targets are probed on 443; anything else on its own
    /// port, which may well be HTTPS on a non-standard port.
    async fn harvest_tls(&self, report: &mut VerificationReport) {
        let targets: Vec<(String, u16)> = report
            .results
            .iter()
            .filter(|r| {
                matches!(
                    r.classification,
                    Classification::Verified | Classification::Likely
                )
            })
            .map(|r| {
                let port = if matches!(r.port, 80 | 443) { 443 } else { r.port };
                (r.ip.clone(), port)
            })
            .collect();
        if targets.is_empty() {
            return;
        }
        info!(hosts = targets.len(), "fetching TLS certificates for verified/likely hosts");

        let client = TlsClient::new(self.config.tls_timeout());
        let harvested = client.bulk_fetch(&targets, self.config.workers).await;

        for result in &mut report.results {
            if !matches!(
                result.classification,
                Classification::Verified | Classification::Likely
            ) {
                continue;
            }
            let port = if matches!(result.port, 80 | 443) { 443 } else { result.port };
            let Some(info) = harvested.get(&(result.ip.clone(), port)) else {
                continue;
            };
            result.tls_common_name = info.common_name.clone();
            result.tls_subject_org = info.subject_org.clone();
            result.tls_issuer = info.issuer.clone();
            result.tls_issuer_org = info.issuer_org.clone();
            result.tls_valid = Some(info.is_valid);
            result.tls_self_signed = Some(info.is_self_signed);
            result.tls_san = info.san.clone();
            result.tls_emails = info.email_addresses.clone();
            result.tls_fingerprint = info.fingerprint_sha256.clone();
            result.tls_error = info.error.clone();
        }
    }
}

/// Verify one candidate: TCP gate, round A, scheme retry, prefix retry.
async fn verify_single_candidate(
    config: &VerificationConfig,
    scoring: &ScoringConfig,
    executor: &ProbeExecutor,
    plan: &ProbePlan,
    app_prefix: Option<&str>,
    candidate: &CandidateHost,
) -> VerificationResult {
    if config.tcp_check
        && !tcp_alive(
            &candidate.ip,
            candidate.port,
            config.tcp_timeout(),
            config.tcp_retries,
        )
        .await
    {
        // Dead host: report it without spending probe time
        let mut result = VerificationResult::for_candidate(candidate, Scheme::Unknown);
        result.verified_at = Some(utc_now_iso());
        return result;
    }

    let initial_scheme = Scheme::initial_for_port(candidate.port);
    let retry_threshold = f64::from(config.retry_threshold);

    let mut result =
        probe_with_scheme(scoring, executor, plan, candidate, initial_scheme, None).await;

    if result.score < retry_threshold {
        let alternate = initial_scheme.alternate();
        let mut alternate_result =
            probe_with_scheme(scoring, executor, plan, candidate, alternate, None).await;
        alternate_result.alternate_scheme_tried = true;
        result.alternate_scheme_tried = true;
        if alternate_result.score > result.score {
            result = alternate_result;
        }
    }

    if result.score < retry_threshold {
        if let Some(prefix) = app_prefix {
            let prefix = format!("/{prefix}");
            let prefixed_plan = plan.with_path_prefix(&prefix);
            debug!(ip = %candidate.ip, %prefix, "retrying under app prefix");
            for scheme in [initial_scheme, initial_scheme.alternate()] {
                let mut prefixed_result = probe_with_scheme(
                    scoring,
                    executor,
                    &prefixed_plan,
                    candidate,
                    scheme,
                    Some(prefix.clone()),
                )
                .await;
                prefixed_result.alternate_scheme_tried = result.alternate_scheme_tried;
                if prefixed_result.score > result.score {
                    result = prefixed_result;
                    if result.score >= retry_threshold {
                        break;
                    }
                }
            }
        }
    }

    result
}

/// Run the plan once under one scheme, folding the additive score with
/// early termination at the cap. Skipped steps still appear in the output.
async fn probe_with_scheme(
    scoring: &ScoringConfig,
    executor: &ProbeExecutor,
    plan: &ProbePlan,
    candidate: &CandidateHost,
    scheme: Scheme,
    prefix_used: Option<String>,
) -> VerificationResult {
    let started = Instant::now();
    let mut result = VerificationResult::for_candidate(candidate, scheme);
    result.prefix_used = prefix_used;

    let base_url = format!("{scheme}://{}:{}", candidate.ip, candidate.port);
    let mut current_score: u32 = 0;

    for step in &plan.probe_steps {
        if current_score >= scoring.max_score {
            result.probe_results.push(ProbeResult::skipped(
                step.order,
                step.check_type,
                &step.url_path,
                step.weight,
            ));
            continue;
        }
        let probe_result = executor.execute_probe(&base_url, step).await;
        current_score += probe_result.points_earned;
        result.probe_results.push(probe_result);
    }

    result.finalize_score(scoring);
    result.verification_duration_ms = Some(started.elapsed().as_millis() as u64);
    result
}

/// TCP liveness gate: a bounded connect attempt, retried. This is what
/// keeps dead candidates from tying up probe workers for full HTTP
/// timeouts.
async fn tcp_alive(ip: &str, port: u16, connect_timeout: std::time::Duration, retries: u32) -> bool {
    for attempt in 1..=retries.max(1) {
        match timeout(connect_timeout, TcpStream::connect((ip, port))).await {
            Ok(Ok(_)) => {
                debug!(ip, port, attempt, "tcp alive");
                return true;
            }
            Ok(Err(e)) => debug!(ip, port, attempt, error = %e, "tcp connect failed"),
            Err(_) => debug!(ip, port, attempt, "tcp connect timed out"),
        }
    }
    debug!(ip, port, "host not reachable");
    false
}
