//! The candidates document written after Phase 2.

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};

use crate::discovery::CandidateHost;
use crate::error::Result;
use crate::util::utc_now_iso;

/// Write the candidates file:
/// `{ fingerprint_run_id, discovery_timestamp, total_candidates,
///    geographic_distribution, candidates }`.
///
/// The geographic distribution is keyed by country, most common first;
/// candidates without a country count under `Unknown`.
pub fn write_candidates(
    path: impl AsRef<Path>,
    fingerprint_run_id: &str,
    candidates: &[CandidateHost],
) -> Result<()> {
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for candidate in candidates {
        let country = candidate
            .location
            .as_ref()
            .and_then(|location| location.get("country"))
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        *counts.entry(country).or_default() += 1;
    }
    let mut ordered: Vec<(String, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let mut distribution = Map::new();
    for (country, count) in ordered {
        distribution.insert(country, Value::from(count));
    }

    let document = json!({
        "fingerprint_run_id": fingerprint_run_id,
        "discovery_timestamp": utc_now_iso(),
        "total_candidates": candidates.len(),
        "geographic_distribution": Value::Object(distribution),
        "candidates": candidates,
    });

    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path.as_ref())?;
    serde_json::to_writer_pretty(file, &document)?;
    Ok(())
}

/// Read the candidates back out of a candidates document.
pub fn read_candidates(path: impl AsRef<Path>) -> Result<Vec<CandidateHost>> {
    let raw = fs::read_to_string(path.as_ref())?;
    let document: Value = serde_json::from_str(&raw)?;
    let candidates = document
        .get("candidates")
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));
    Ok(serde_json::from_value(candidates)?)
}
