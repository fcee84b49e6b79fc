//! Configuration for the discovery and verification engines.
//!
//! All defaults live here; the engines never hardcode a threshold or a
//! worker count. Builders follow the `with_*` convention so callers can
//! override a single knob without spelling out the rest.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the discovery engine combines the per-query cache with live API calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Only read the cache; a miss or expired entry yields an empty result
    CacheOnly,
    /// Ignore cached entries, always call the plugin, write fresh entries
    NewOnly,
    /// Read the cache first, call the plugin on miss or expiry (default)
    #[default]
    CacheAndNew,
}

/// Configuration for Phase 2 passive discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Directory holding `query_<hash>.json` cache files
    pub cache_dir: PathBuf,
    /// Cache time-to-live in days; 0 means entries never expire
    pub cache_ttl_days: u32,
    /// Cache strategy
    pub cache_strategy: CacheStrategy,
    /// Maximum queries generated from one fingerprint
    pub max_queries: usize,
    /// Maximum candidates returned after deduplication; `None` = unlimited
    pub max_candidates: Option<usize>,
    /// Maximum results requested per query; `None` = everything the source has
    pub max_results_per_query: Option<usize>,
    /// Whether to enrich candidates with IP intelligence data
    pub enrich: bool,
    /// Concurrent workers for enrichment lookups
    pub enrich_workers: usize,
    /// Restrict discovery to these plugin names; `None` = all configured
    pub enabled_plugins: Option<Vec<String>>,
    /// Ask the operator to approve/deny/modify each query before execution
    pub interactive: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("output/cache"),
            cache_ttl_days: 7,
            cache_strategy: CacheStrategy::default(),
            max_queries: 10,
            max_candidates: None,
            max_results_per_query: None,
            enrich: true,
            enrich_workers: 20,
            enabled_plugins: None,
            interactive: false,
        }
    }
}

impl DiscoveryConfig {
    /// Create a discovery configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache directory
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the cache TTL in days (0 disables expiry)
    #[must_use]
    pub fn with_cache_ttl_days(mut self, days: u32) -> Self {
        self.cache_ttl_days = days;
        self
    }

    /// Set the cache strategy
    #[must_use]
    pub fn with_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.cache_strategy = strategy;
        self
    }

    /// Set the maximum number of generated queries
    #[must_use]
    pub fn with_max_queries(mut self, max: usize) -> Self {
        self.max_queries = max;
        self
    }

    /// Cap the deduplicated candidate set
    #[must_use]
    pub fn with_max_candidates(mut self, max: Option<usize>) -> Self {
        self.max_candidates = max;
        self
    }

    /// Enable or disable enrichment
    #[must_use]
    pub fn with_enrich(mut self, enrich: bool) -> Self {
        self.enrich = enrich;
        self
    }

    /// Restrict discovery to named plugins
    #[must_use]
    pub fn with_enabled_plugins(mut self, plugins: Vec<String>) -> Self {
        self.enabled_plugins = Some(plugins);
        self
    }

    /// Enable interactive query review
    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

/// Configuration for Phase 3 active verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Concurrent candidate workers
    pub workers: usize,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header for probe traffic; `None` uses the built-in default
    pub user_agent: Option<String>,
    /// Run a TCP liveness check before probing each candidate
    pub tcp_check: bool,
    /// TCP connect timeout in seconds
    pub tcp_timeout_secs: f64,
    /// TCP connect attempts before declaring a host dead
    pub tcp_retries: u32,
    /// Harvest TLS certificates for verified/likely results
    pub fetch_tls: bool,
    /// TLS handshake timeout in seconds
    pub tls_timeout_secs: u64,
    /// Below this score, the engine retries with the alternate scheme and
    /// the app prefix
    pub retry_threshold: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            timeout_secs: 10,
            user_agent: None,
            tcp_check: true,
            tcp_timeout_secs: 2.0,
            tcp_retries: 2,
            fetch_tls: true,
            tls_timeout_secs: 5,
            retry_threshold: 50,
        }
    }
}

impl VerificationConfig {
    /// Create a verification configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP request timeout as a [`Duration`]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// TCP connect timeout as a [`Duration`]
    #[must_use]
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tcp_timeout_secs)
    }

    /// TLS handshake timeout as a [`Duration`]
    #[must_use]
    pub fn tls_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_timeout_secs)
    }

    /// Set the worker pool size
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the HTTP timeout in seconds
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the probe User-Agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Enable or disable the TCP liveness gate
    #[must_use]
    pub fn with_tcp_check(mut self, enabled: bool) -> Self {
        self.tcp_check = enabled;
        self
    }

    /// Enable or disable TLS certificate harvesting
    #[must_use]
    pub fn with_fetch_tls(mut self, enabled: bool) -> Self {
        self.fetch_tls = enabled;
        self
    }

    /// Set the low-score retry threshold
    #[must_use]
    pub fn with_retry_threshold(mut self, threshold: u32) -> Self {
        self.retry_threshold = threshold;
        self
    }
}

/// Probe point values and classification thresholds.
///
/// `max_score` caps the additive score and drives early termination;
/// `verified` is the classification cutoff. The two are distinct on
/// purpose: a plan whose weights do not sum to exactly `max_score` can
/// cross the verified line and still keep probing toward the cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Points for a favicon hash match
    pub favicon_points: u32,
    /// Points for an image hash match
    pub image_points: u32,
    /// Points for a title pattern match
    pub title_points: u32,
    /// Points per matched body pattern
    pub body_points: u32,
    /// Score cap and early-termination cutoff
    pub max_score: u32,
    /// Classification threshold: `score >= verified` ⇒ verified
    pub verified: u32,
    /// Classification threshold: `score >= likely` ⇒ likely
    pub likely: u32,
    /// Classification threshold: `score >= partial` ⇒ partial
    pub partial: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            favicon_points: 80,
            image_points: 50,
            title_points: 15,
            body_points: 15,
            max_score: 100,
            verified: 80,
            likely: 50,
            partial: 30,
        }
    }
}

impl ScoringConfig {
    /// Create a scoring configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.cache_ttl_days, 7);
        assert_eq!(config.max_queries, 10);
        assert_eq!(config.enrich_workers, 20);
        assert!(config.max_candidates.is_none());
        assert_eq!(config.cache_strategy, CacheStrategy::CacheAndNew);
    }

    #[test]
    fn test_verification_defaults() {
        let config = VerificationConfig::default();
        assert_eq!(config.workers, 10);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.tcp_timeout(), Duration::from_secs(2));
        assert_eq!(config.tcp_retries, 2);
        assert!(config.tcp_check);
        assert!(config.fetch_tls);
        assert_eq!(config.retry_threshold, 50);
    }

    #[test]
    fn test_scoring_defaults() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.favicon_points, 80);
        assert_eq!(scoring.image_points, 50);
        assert_eq!(scoring.title_points, 15);
        assert_eq!(scoring.body_points, 15);
        assert_eq!(scoring.max_score, 100);
        assert!(scoring.verified >= scoring.likely && scoring.likely >= scoring.partial);
    }

    #[test]
    fn test_cache_strategy_serde_names() {
        let json = serde_json::to_string(&CacheStrategy::CacheAndNew).unwrap();
        assert_eq!(json, "\"cache_and_new\"");
        let back: CacheStrategy = serde_json::from_str("\"cache_only\"").unwrap();
        assert_eq!(back, CacheStrategy::CacheOnly);
    }

    #[test]
    fn test_builders() {
        let config = DiscoveryConfig::new()
            .with_cache_ttl_days(0)
            .with_max_queries(5)
            .with_interactive(true);
        assert_eq!(config.cache_ttl_days, 0);
        assert_eq!(config.max_queries, 5);
        assert!(config.interactive);

        let verify = VerificationConfig::new().with_workers(0);
        assert_eq!(verify.workers, 1);
    }
}
