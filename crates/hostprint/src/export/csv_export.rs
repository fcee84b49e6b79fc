//! Flat CSV rendering of verification results, for spreadsheet triage.

use std::path::Path;

use crate::error::Result;
use crate::verify::{VerificationReport, VerificationResult};

const HEADERS: [&str; 12] = [
    "ip",
    "port",
    "url",
    "score",
    "classification",
    "scheme",
    "matched_probes",
    "total_probes",
    "country",
    "organization",
    "tls_common_name",
    "sources",
];

/// Write one CSV row per result, sorted by score descending.
pub fn write_results_csv(path: impl AsRef<Path>, report: &VerificationReport) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(HEADERS)?;

    let mut sorted: Vec<&VerificationResult> = report.results.iter().collect();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    for result in sorted {
        let country = result
            .location
            .as_ref()
            .and_then(|location| location.get("country"))
            .cloned()
            .unwrap_or_default();
        let classification = serde_json::to_value(result.classification)
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_default();
        writer.write_record([
            result.ip.as_str(),
            &result.port.to_string(),
            &result.url(),
            &format!("{:.1}", result.score),
            &classification,
            &result.scheme.to_string(),
            &result.matched_probes.to_string(),
            &result.total_probes.to_string(),
            &country,
            result.organization.as_deref().unwrap_or(""),
            result.tls_common_name.as_deref().unwrap_or(""),
            &result.sources.join("|"),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
