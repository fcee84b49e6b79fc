//! Candidate hosts and `(ip, port)` deduplication.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::plugin::NormalizedHost;

/// A candidate host nominated by passive discovery, keyed by `(ip, port)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateHost {
    /// IP address
    pub ip: String,
    /// Port number
    pub port: u16,
    /// Best-known hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Names of every plugin that found this host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Most recent observation, ISO-8601 UTC. String comparison is the
    /// ordering, which is why the format is enforced on the way in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    /// Geographic fields, populated keys only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<BTreeMap<String, String>>,
    /// Autonomous system number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    /// Announcing organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Hosting provider name, from enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosting_provider: Option<String>,
    /// Whether the address belongs to a cloud/hosting provider
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_cloud_hosted: bool,
    /// When enrichment ran, ISO-8601 UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<String>,
}

impl CandidateHost {
    /// Deduplication identity
    #[must_use]
    pub fn key(&self) -> (String, u16) {
        (self.ip.clone(), self.port)
    }

    /// Build a candidate from a plugin's normalized host, enforcing
    /// ISO-8601 UTC on `last_seen` so merge ordering stays sound.
    #[must_use]
    pub fn from_normalized(host: NormalizedHost) -> Self {
        let last_seen = host.last_seen.and_then(|ts| normalize_timestamp(&ts));
        Self {
            ip: host.ip,
            port: host.port,
            hostname: host.hostname,
            sources: vec![host.source],
            last_seen,
            location: if host.location.is_empty() {
                None
            } else {
                Some(host.location)
            },
            asn: host.metadata.asn,
            organization: host.metadata.org,
            hosting_provider: None,
            is_cloud_hosted: false,
            enriched_at: None,
        }
    }

    /// Merge another candidate with the same `(ip, port)`: union sources,
    /// keep the newest `last_seen`, first non-empty value elsewhere.
    #[must_use]
    pub fn merge_with(mut self, other: CandidateHost) -> CandidateHost {
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        self.last_seen = match (self.last_seen.take(), other.last_seen) {
            (Some(a), Some(b)) => Some(if b > a { b } else { a }),
            (a, b) => a.or(b),
        };
        self.hostname = self.hostname.or(other.hostname);
        self.location = self.location.or(other.location);
        self.asn = self.asn.or(other.asn);
        self.organization = self.organization.or(other.organization);
        self.hosting_provider = self.hosting_provider.or(other.hosting_provider);
        self.is_cloud_hosted = self.is_cloud_hosted || other.is_cloud_hosted;
        self.enriched_at = self.enriched_at.or(other.enriched_at);
        self
    }
}

/// Coerce a source timestamp into ISO-8601 UTC with `Z` suffix.
///
/// Sources emit RFC 3339 with offsets, bare `Z` forms, or naive
/// timestamps (assumed UTC). Anything unparseable is dropped rather than
/// allowed to corrupt the string ordering.
fn normalize_timestamp(value: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        );
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(
            naive
                .and_utc()
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        );
    }
    debug!(value, "dropping non-ISO last_seen timestamp");
    None
}

/// Fold candidates into one entry per `(ip, port)`, preserving
/// first-seen order.
#[must_use]
pub fn deduplicate_candidates(candidates: Vec<CandidateHost>) -> Vec<CandidateHost> {
    let mut order: Vec<(String, u16)> = Vec::new();
    let mut merged: HashMap<(String, u16), CandidateHost> = HashMap::new();
    for candidate in candidates {
        let key = candidate.key();
        match merged.remove(&key) {
            Some(existing) => {
                merged.insert(key, existing.merge_with(candidate));
            }
            None => {
                order.push(key.clone());
                merged.insert(key, candidate);
            }
        }
    }
    order.into_iter().filter_map(|key| merged.remove(&key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::plugin::{HostMetadata, Protocol};

    fn candidate(ip: &str, port: u16, source: &str) -> CandidateHost {
        CandidateHost {
            ip: ip.to_string(),
            port,
            hostname: None,
            sources: vec![source.to_string()],
            last_seen: None,
            location: None,
            asn: None,
            organization: None,
            hosting_provider: None,
            is_cloud_hosted: false,
            enriched_at: None,
        }
    }

    #[test]
    fn test_dedup_no_shared_keys() {
        let candidates = vec![
            candidate("1.1.1.1", 80, "shodan"),
            candidate("1.1.1.1", 80, "censys"),
            candidate("1.1.1.1", 443, "shodan"),
            candidate("2.2.2.2", 80, "censys"),
        ];
        let deduped = deduplicate_candidates(candidates);
        assert_eq!(deduped.len(), 3);
        let mut keys: Vec<(String, u16)> = deduped.iter().map(CandidateHost::key).collect();
        let total = keys.len();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_dedup_unions_sources() {
        let candidates = vec![
            candidate("1.1.1.1", 80, "shodan"),
            candidate("1.1.1.1", 80, "censys"),
            candidate("1.1.1.1", 80, "shodan"),
        ];
        let deduped = deduplicate_candidates(candidates);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].sources, vec!["shodan", "censys"]);
    }

    #[test]
    fn test_dedup_preserves_first_seen_order() {
        let candidates = vec![
            candidate("9.9.9.9", 80, "shodan"),
            candidate("1.1.1.1", 80, "shodan"),
            candidate("9.9.9.9", 80, "censys"),
        ];
        let deduped = deduplicate_candidates(candidates);
        assert_eq!(deduped[0].ip, "9.9.9.9");
        assert_eq!(deduped[1].ip, "1.1.1.1");
    }

    #[test]
    fn test_merge_keeps_newest_last_seen_and_first_nonempty() {
        let mut a = candidate("1.1.1.1", 80, "shodan");
        a.last_seen = Some("2025-01-01T00:00:00.000000Z".to_string());
        a.organization = Some("First Org".to_string());
        let mut b = candidate("1.1.1.1", 80, "censys");
        b.last_seen = Some("2025-06-01T00:00:00.000000Z".to_string());
        b.organization = Some("Second Org".to_string());
        b.asn = Some("AS64496".to_string());

        let merged = a.merge_with(b);
        assert_eq!(merged.last_seen.as_deref(), Some("2025-06-01T00:00:00.000000Z"));
        assert_eq!(merged.organization.as_deref(), Some("First Org"));
        assert_eq!(merged.asn.as_deref(), Some("AS64496"));
    }

    #[test]
    fn test_from_normalized_enforces_iso_last_seen() {
        let host = NormalizedHost {
            ip: "1.2.3.4".to_string(),
            port: 8080,
            protocol: Protocol::Http,
            hostname: Some("h.example".to_string()),
            source: "shodan".to_string(),
            first_seen: None,
            last_seen: Some("2025-03-04T05:06:07.123456+02:00".to_string()),
            location: BTreeMap::new(),
            metadata: HostMetadata {
                asn: Some("AS64496".to_string()),
                org: Some("Example".to_string()),
                hostnames: vec!["h.example".to_string()],
            },
        };
        let candidate = CandidateHost::from_normalized(host);
        // Offset collapsed to UTC
        assert_eq!(
            candidate.last_seen.as_deref(),
            Some("2025-03-04T03:06:07.123456Z")
        );
        assert_eq!(candidate.sources, vec!["shodan"]);
        assert_eq!(candidate.asn.as_deref(), Some("AS64496"));
    }

    #[test]
    fn test_from_normalized_drops_garbage_timestamps() {
        let host = NormalizedHost {
            ip: "1.2.3.4".to_string(),
            port: 80,
            protocol: Protocol::Http,
            hostname: None,
            source: "censys".to_string(),
            first_seen: None,
            last_seen: Some("last tuesday".to_string()),
            location: BTreeMap::new(),
            metadata: HostMetadata::default(),
        };
        assert!(CandidateHost::from_normalized(host).last_seen.is_none());
    }

    #[test]
    fn test_naive_timestamps_assumed_utc() {
        assert_eq!(
            normalize_timestamp("2024-01-15T10:20:30.000000"),
            Some("2024-01-15T10:20:30.000000Z".to_string())
        );
    }

    #[test]
    fn test_serialization_omits_empty_fields() {
        let json = serde_json::to_string(&candidate("1.1.1.1", 80, "shodan")).unwrap();
        assert!(!json.contains("hostname"));
        assert!(!json.contains("is_cloud_hosted"));
        assert!(!json.contains("location"));
        assert!(json.contains("\"sources\":[\"shodan\"]"));
    }
}
