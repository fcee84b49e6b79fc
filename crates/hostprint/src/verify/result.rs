//! Verification result records and additive scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::fingerprint::CheckType;
use crate::util::utc_now_iso;

/// Scheme a candidate was verified under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
    /// Never probed (the TCP liveness gate failed)
    Unknown,
}

impl Scheme {
    /// Initial scheme guess for a port: HTTPS for 443/8443, HTTP otherwise
    #[must_use]
    pub fn initial_for_port(port: u16) -> Self {
        if matches!(port, 443 | 8443) {
            Self::Https
        } else {
            Self::Http
        }
    }

    /// The other scheme, for the low-score retry
    #[must_use]
    pub fn alternate(self) -> Self {
        match self {
            Self::Http => Self::Https,
            Self::Https | Self::Unknown => Self::Http,
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Verdict for one candidate, a pure function of its score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Nothing matched
    #[default]
    NoMatch,
    /// Something matched, but weakly
    Unlikely,
    /// Partial signal agreement
    Partial,
    /// Strong signal agreement
    Likely,
    /// Score at or above the verified threshold
    Verified,
}

/// Map a score to its classification. Monotonic nondecreasing in `score`.
#[must_use]
pub fn classify(score: f64, scoring: &ScoringConfig) -> Classification {
    if score >= f64::from(scoring.verified) {
        Classification::Verified
    } else if score >= f64::from(scoring.likely) {
        Classification::Likely
    } else if score >= f64::from(scoring.partial) {
        Classification::Partial
    } else if score > 0.0 {
        Classification::Unlikely
    } else {
        Classification::NoMatch
    }
}

/// Result of a single probe step execution.
///
/// Skipped steps (early termination) still appear, with `skipped = true`
/// and zero points, so a report reader can audit exactly what ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Order of the originating probe step
    pub probe_order: u32,
    /// Check type of the originating step
    pub probe_type: CheckType,
    /// Path that was (or would have been) requested; annotated when a
    /// fallback or discovered path answered instead
    pub url_path: String,

    /// The probe executed without a transport error
    #[serde(default)]
    pub success: bool,
    /// The probe matched (fully or partially)
    #[serde(default)]
    pub matched: bool,
    /// The probe was skipped by early termination
    #[serde(default)]
    pub skipped: bool,

    /// What the probe expected, for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// What the probe observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Transport or execution error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Round-trip time of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// HTTP status of the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    /// Points this probe contributed
    #[serde(default, skip_serializing_if = "is_zero")]
    pub points_earned: u32,
    /// Points this probe could have contributed
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_points: u32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl ProbeResult {
    /// Empty result for a probe step, before execution
    #[must_use]
    pub fn pending(order: u32, probe_type: CheckType, url_path: impl Into<String>) -> Self {
        Self {
            probe_order: order,
            probe_type,
            url_path: url_path.into(),
            success: false,
            matched: false,
            skipped: false,
            expected: None,
            actual: None,
            error: None,
            response_time_ms: None,
            http_status: None,
            points_earned: 0,
            max_points: 0,
        }
    }

    /// Result for a step skipped by early termination
    #[must_use]
    pub fn skipped(order: u32, probe_type: CheckType, url_path: impl Into<String>, max_points: u32) -> Self {
        let mut result = Self::pending(order, probe_type, url_path);
        result.skipped = true;
        result.max_points = max_points;
        result
    }
}

/// Verification verdict for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// IP address
    pub ip: String,
    /// Port number
    pub port: u16,
    /// Hostname carried over from discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Probes executed (skipped ones excluded)
    #[serde(default)]
    pub total_probes: usize,
    /// Executed probes that earned points
    #[serde(default)]
    pub matched_probes: usize,
    /// Additive score, capped at the configured maximum
    #[serde(default)]
    pub score: f64,
    /// Verdict derived from the score
    #[serde(default)]
    pub classification: Classification,

    /// Per-step results in plan order, skipped steps included
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_results: Vec<ProbeResult>,

    /// Plugins that nominated this candidate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Geographic fields from discovery/enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<BTreeMap<String, String>>,
    /// Autonomous system number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    /// Announcing organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Hosting provider from enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosting_provider: Option<String>,
    /// Cloud-hosted flag from enrichment
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_cloud_hosted: bool,

    /// TLS subject common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_common_name: Option<String>,
    /// TLS subject organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_subject_org: Option<String>,
    /// TLS issuer common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_issuer: Option<String>,
    /// TLS issuer organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_issuer_org: Option<String>,
    /// Whether the certificate is inside its validity window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_valid: Option<bool>,
    /// Whether the certificate is self-signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_self_signed: Option<bool>,
    /// Subject alternative names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls_san: Vec<String>,
    /// Email addresses found in the certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls_emails: Vec<String>,
    /// SHA-256 fingerprint of the DER certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_fingerprint: Option<String>,
    /// Error from the TLS harvest, when it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_error: Option<String>,

    /// When the verdict was reached, ISO-8601 UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
    /// Wall time spent on this candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_duration_ms: Option<u64>,
    /// Scheme the verdict was reached under
    #[serde(default)]
    pub scheme: Scheme,
    /// Whether the alternate scheme was also tried
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub alternate_scheme_tried: bool,
    /// App prefix in effect for the verdict, e.g. `/dvwa`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_used: Option<String>,
}

impl VerificationResult {
    /// Empty result carrying a candidate's identity and discovery metadata.
    #[must_use]
    pub fn for_candidate(candidate: &crate::discovery::CandidateHost, scheme: Scheme) -> Self {
        Self {
            ip: candidate.ip.clone(),
            port: candidate.port,
            hostname: candidate.hostname.clone(),
            total_probes: 0,
            matched_probes: 0,
            score: 0.0,
            classification: Classification::NoMatch,
            probe_results: Vec::new(),
            sources: candidate.sources.clone(),
            location: candidate.location.clone(),
            asn: candidate.asn.clone(),
            organization: candidate.organization.clone(),
            hosting_provider: candidate.hosting_provider.clone(),
            is_cloud_hosted: candidate.is_cloud_hosted,
            tls_common_name: None,
            tls_subject_org: None,
            tls_issuer: None,
            tls_issuer_org: None,
            tls_valid: None,
            tls_self_signed: None,
            tls_san: Vec::new(),
            tls_emails: Vec::new(),
            tls_fingerprint: None,
            tls_error: None,
            verified_at: None,
            verification_duration_ms: None,
            scheme,
            alternate_scheme_tried: false,
            prefix_used: None,
        }
    }

    /// Base URL of the verdict: `scheme://ip:port[prefix]`
    #[must_use]
    pub fn url(&self) -> String {
        let base = format!("{}://{}:{}", self.scheme, self.ip, self.port);
        match &self.prefix_used {
            Some(prefix) => format!("{base}{prefix}"),
            None => base,
        }
    }

    /// Fold the probe results into the additive score and classify.
    ///
    /// `score = min(max_score, Σ points_earned over non-skipped probes)`;
    /// classification reads the separate thresholds, never the cap.
    pub fn finalize_score(&mut self, scoring: &ScoringConfig) {
        let executed: Vec<&ProbeResult> =
            self.probe_results.iter().filter(|p| !p.skipped).collect();
        self.total_probes = executed.len();
        self.matched_probes = executed.iter().filter(|p| p.points_earned > 0).count();
        let total_points: u32 = executed.iter().map(|p| p.points_earned).sum();
        self.score = f64::from(total_points.min(scoring.max_score));
        self.classification = classify(self.score, scoring);
        self.verified_at = Some(utc_now_iso());
    }

    /// Whether any probe recorded an error
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.probe_results.iter().any(|p| p.error.is_some())
    }

    /// Serialized record with the derived `url` injected, for reports.
    #[must_use]
    pub fn export_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.insert("url".to_string(), serde_json::Value::String(self.url()));
        }
        value
    }
}

/// Report covering every candidate of a verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Run id of the fingerprint that drove the verification
    pub fingerprint_run_id: String,
    /// Application name from the fingerprint
    pub app_name: String,

    /// Candidate count
    #[serde(default)]
    pub total_candidates: usize,
    /// Results classified verified
    #[serde(default)]
    pub verified_count: usize,
    /// Results classified likely
    #[serde(default)]
    pub likely_count: usize,
    /// Results classified partial
    #[serde(default)]
    pub partial_count: usize,
    /// Results classified unlikely
    #[serde(default)]
    pub unlikely_count: usize,
    /// Results with no match at all
    #[serde(default)]
    pub no_match_count: usize,
    /// Results where at least one probe errored
    #[serde(default)]
    pub error_count: usize,

    /// All results, including zero scores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<VerificationResult>,

    /// When verification started
    pub verification_started: String,
    /// When verification finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_completed: Option<String>,
    /// Total wall time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
}

impl VerificationReport {
    /// Start an empty report for a run
    #[must_use]
    pub fn new(fingerprint_run_id: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            fingerprint_run_id: fingerprint_run_id.into(),
            app_name: app_name.into(),
            total_candidates: 0,
            verified_count: 0,
            likely_count: 0,
            partial_count: 0,
            unlikely_count: 0,
            no_match_count: 0,
            error_count: 0,
            results: Vec::new(),
            verification_started: utc_now_iso(),
            verification_completed: None,
            total_duration_ms: None,
        }
    }

    /// Recompute the per-classification counters from the results
    pub fn calculate_summary(&mut self) {
        self.total_candidates = self.results.len();
        self.verified_count = self.count(Classification::Verified);
        self.likely_count = self.count(Classification::Likely);
        self.partial_count = self.count(Classification::Partial);
        self.unlikely_count = self.count(Classification::Unlikely);
        self.no_match_count = self.count(Classification::NoMatch);
        self.error_count = self.results.iter().filter(|r| r.has_errors()).count();
    }

    fn count(&self, classification: Classification) -> usize {
        self.results
            .iter()
            .filter(|r| r.classification == classification)
            .count()
    }
}
