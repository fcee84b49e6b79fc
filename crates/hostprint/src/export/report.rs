//! The verification report document written after Phase 3.

use std::fs;
use std::path::Path;

use serde_json::json;

use crate::error::Result;
use crate::verify::{VerificationReport, VerificationResult};

/// Write the verification report:
/// `{ fingerprint_run_id, app_name, verification_started,
///    verification_completed, total_duration_ms, summary, results }`.
///
/// Results are sorted by score descending and carry the derived `url`.
pub fn write_verification_report(
    path: impl AsRef<Path>,
    report: &VerificationReport,
    include_all: bool,
) -> Result<()> {
    let mut sorted: Vec<&VerificationResult> = report.results.iter().collect();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let results: Vec<serde_json::Value> = sorted
        .into_iter()
        .filter(|r| include_all || r.score > 0.0)
        .map(VerificationResult::export_value)
        .collect();

    let document = json!({
        "fingerprint_run_id": report.fingerprint_run_id,
        "app_name": report.app_name,
        "verification_started": report.verification_started,
        "verification_completed": report.verification_completed,
        "total_duration_ms": report.total_duration_ms,
        "summary": {
            "total": report.total_candidates,
            "verified": report.verified_count,
            "likely": report.likely_count,
            "partial": report.partial_count,
            "unlikely": report.unlikely_count,
            "no_match": report.no_match_count,
            "errors": report.error_count,
        },
        "results": results,
    });

    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path.as_ref())?;
    serde_json::to_writer_pretty(file, &document)?;
    Ok(())
}
