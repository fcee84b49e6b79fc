//! The passive discovery engine.
//!
//! Drives a fingerprint's query plan across every configured plugin with
//! per-query caching, optional operator review, deduplication by
//! `(ip, port)`, and optional IP enrichment. Queries run sequentially per
//! plugin: the log stays readable and each source's rate limits are
//! honored by the source's own plugin.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::cache::QueryCacheStore;
use super::candidate::{deduplicate_candidates, CandidateHost};
use super::planner::plan_queries;
use super::plugin::{DiscoveryPlugin, DiscoveryQuery};
use super::registry::PluginRegistry;
use crate::config::{CacheStrategy, DiscoveryConfig};
use crate::enrich::IpLookup;
use crate::error::Result;
use crate::fingerprint::FingerprintSpec;
use crate::prompt::{OperatorPrompt, ReviewDecision};
use crate::util::{truncate_chars, utc_now_iso};

/// Outcome of a discovery run: the deduplicated candidates plus counters
/// for the operator-facing summary.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySummary {
    /// Deduplicated candidate set, capped at `max_candidates`
    pub candidates: Vec<CandidateHost>,
    /// Queries answered from cache
    pub cached_queries: usize,
    /// Queries that hit a plugin API
    pub fresh_queries: usize,
    /// Candidates flagged as cloud-hosted by enrichment
    pub cloud_hosted: usize,
    /// Whether the run stopped early on operator decision
    pub aborted: bool,
}

/// Phase 2 engine: fingerprint in, candidate set out.
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    cache: QueryCacheStore,
}

impl DiscoveryEngine {
    /// Create an engine; opens (and creates) the cache directory.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let cache = QueryCacheStore::new(&config.cache_dir, config.cache_ttl_days)?;
        Ok(Self { config, cache })
    }

    /// The engine's cache store, for maintenance commands.
    #[must_use]
    pub fn cache(&self) -> &QueryCacheStore {
        &self.cache
    }

    /// Discover candidate hosts for a fingerprint.
    ///
    /// Plugin errors never abort the run on their own; the operator (or
    /// the non-interactive [`AutoPrompt`](crate::prompt::AutoPrompt)
    /// policy) decides whether to continue, and results gathered before a
    /// stop are preserved.
    pub async fn discover(
        &self,
        fingerprint: &FingerprintSpec,
        registry: &PluginRegistry,
        prompt: &dyn OperatorPrompt,
        enricher: Option<&dyn IpLookup>,
    ) -> Result<DiscoverySummary> {
        let mut summary = DiscoverySummary::default();

        let plugins = self.select_plugins(registry);
        if plugins.is_empty() {
            warn!("no configured discovery plugins; set SHODAN_API_KEY or CENSYS_PERSONAL_ACCESS_TOKEN");
            return Ok(summary);
        }
        info!(
            app_name = %fingerprint.app_name,
            plugins = ?plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            strategy = ?self.config.cache_strategy,
            "starting passive discovery"
        );

        let mut queries = plan_queries(fingerprint, self.config.max_queries);
        info!(count = queries.len(), max = self.config.max_queries, "generated discovery queries");

        if self.config.interactive && !queries.is_empty() {
            queries = review_queries(queries, prompt);
            if queries.is_empty() {
                warn!("all queries denied by operator");
                return Ok(summary);
            }
            info!(approved = queries.len(), "queries approved for execution");
        }

        let mut all_candidates: Vec<CandidateHost> = Vec::new();
        'plugins: for plugin in &plugins {
            let plugin_queries: Vec<&DiscoveryQuery> = queries
                .iter()
                .filter(|q| plugin.supports_query_type(q.query_type))
                .collect();
            if plugin_queries.is_empty() {
                continue;
            }
            info!(plugin = plugin.name(), queries = plugin_queries.len(), "processing queries");

            for query in plugin_queries {
                let (candidates, from_cache, error) =
                    self.execute_query_with_cache(plugin.as_ref(), query).await;
                all_candidates.extend(candidates);
                if from_cache {
                    summary.cached_queries += 1;
                } else {
                    summary.fresh_queries += 1;
                }

                if let Some(error) = error {
                    if !prompt.continue_after_error(&error) {
                        warn!("discovery stopped by operator after plugin error");
                        summary.aborted = true;
                        break 'plugins;
                    }
                }
            }
        }

        info!(
            cached = summary.cached_queries,
            fresh = summary.fresh_queries,
            raw = all_candidates.len(),
            "aggregating candidates"
        );

        let mut deduplicated = deduplicate_candidates(all_candidates);
        info!(unique = deduplicated.len(), "deduplicated by ip:port");
        if let Some(max) = self.config.max_candidates {
            deduplicated.truncate(max);
        }

        if self.config.enrich {
            if let Some(enricher) = enricher {
                summary.cloud_hosted = self.enrich_candidates(&mut deduplicated, enricher).await;
            } else {
                debug!("enrichment skipped: no IP lookup client configured");
            }
        }

        info!(candidates = deduplicated.len(), "discovery complete");
        summary.candidates = deduplicated;
        Ok(summary)
    }

    fn select_plugins(&self, registry: &PluginRegistry) -> Vec<Arc<dyn DiscoveryPlugin>> {
        match &self.config.enabled_plugins {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    let plugin = registry.get(name);
                    if plugin.is_none() {
                        warn!(plugin = %name, "requested plugin is not registered");
                    }
                    plugin
                })
                .filter(|p| {
                    let configured = p.is_configured();
                    if !configured {
                        warn!(plugin = p.name(), "requested plugin has no credentials");
                    }
                    configured
                })
                .collect(),
            None => registry.configured_plugins(),
        }
    }

    /// Execute one query with cache handling. Returns the candidates, a
    /// served-from-cache flag, and the plugin error when one occurred.
    pub async fn execute_query_with_cache(
        &self,
        plugin: &dyn DiscoveryPlugin,
        query: &DiscoveryQuery,
    ) -> (Vec<CandidateHost>, bool, Option<String>) {
        let query_string = query.cache_string();
        let query_hash = super::cache::QueryCache::hash_query(plugin.name(), &query_string);
        let display_value = truncate_chars(&query.value, 60);

        if matches!(
            self.config.cache_strategy,
            CacheStrategy::CacheOnly | CacheStrategy::CacheAndNew
        ) {
            if let Some(cached) = self.cache.load(&query_hash) {
                let age_days = self.cache.age_days(&cached).unwrap_or_default();
                info!(
                    plugin = plugin.name(),
                    label = query.label(),
                    value = %display_value,
                    results = cached.result_count,
                    age_days,
                    "cache hit"
                );
                return (cached.candidates, true, None);
            }
            if self.config.cache_strategy == CacheStrategy::CacheOnly {
                if self.cache.exists(&query_hash) {
                    info!(plugin = plugin.name(), value = %display_value, "cache entry expired");
                } else {
                    info!(plugin = plugin.name(), value = %display_value, "no cache entry");
                }
                return (Vec::new(), true, None);
            }
        }

        let result = plugin
            .search(query, self.config.max_results_per_query)
            .await;

        if result.success() {
            let candidates: Vec<CandidateHost> = result
                .hosts
                .into_iter()
                .map(CandidateHost::from_normalized)
                .collect();
            info!(
                plugin = plugin.name(),
                label = query.label(),
                value = %display_value,
                results = candidates.len(),
                "query executed"
            );
            if let Err(e) = self
                .cache
                .save(plugin.name(), query.label(), &query_string, &candidates)
            {
                debug!(error = %e, "cache write failed; continuing without cache");
            }
            (candidates, false, None)
        } else {
            let error = result.error.unwrap_or_else(|| "unknown error".to_string());
            let native = plugin
                .translate_query(query)
                .unwrap_or_else(|| query_string.clone());
            warn!(
                plugin = plugin.name(),
                label = query.label(),
                value = %display_value,
                query = %native,
                error = %error,
                "query failed"
            );
            // Partial results from a failed pagination still count
            let candidates: Vec<CandidateHost> = result
                .hosts
                .into_iter()
                .map(CandidateHost::from_normalized)
                .collect();
            (candidates, false, Some(error))
        }
    }

    /// Enrich candidates in place; returns the cloud-hosted count.
    ///
    /// Lookups fan out across `enrich_workers`; results only fill fields
    /// discovery left empty.
    async fn enrich_candidates(
        &self,
        candidates: &mut [CandidateHost],
        enricher: &dyn IpLookup,
    ) -> usize {
        if candidates.is_empty() {
            return 0;
        }
        let mut unique_ips: Vec<String> = candidates.iter().map(|c| c.ip.clone()).collect();
        unique_ips.sort();
        unique_ips.dedup();
        info!(candidates = candidates.len(), unique_ips = unique_ips.len(), "enriching candidates");

        let records: BTreeMap<String, crate::enrich::IpInfoRecord> = stream::iter(unique_ips)
            .map(|ip| async move { (ip.clone(), enricher.lookup(&ip).await) })
            .buffer_unordered(self.config.enrich_workers.max(1))
            .collect()
            .await;

        let enriched_at = utc_now_iso();
        let mut cloud_hosted = 0;
        for candidate in candidates.iter_mut() {
            let Some(record) = records.get(&candidate.ip) else {
                continue;
            };
            candidate.hosting_provider = record.hosting_provider.clone();
            candidate.is_cloud_hosted = record.is_hosting;
            candidate.enriched_at = Some(enriched_at.clone());

            if candidate.location.is_none() && (record.country.is_some() || record.city.is_some()) {
                let mut location = BTreeMap::new();
                if let Some(country) = &record.country {
                    location.insert("country".to_string(), country.clone());
                }
                if let Some(country_name) = &record.country_name {
                    location.insert("country_name".to_string(), country_name.clone());
                }
                if let Some(city) = &record.city {
                    location.insert("city".to_string(), city.clone());
                }
                if let Some(region) = &record.region {
                    location.insert("region".to_string(), region.clone());
                }
                candidate.location = Some(location);
            }
            if candidate.hostname.is_none() {
                candidate.hostname = record.hostname.clone();
            }
            if candidate.organization.is_none() {
                candidate.organization = record.company.clone();
            }
            if candidate.asn.is_none() {
                candidate.asn = record.asn.clone();
            }
            if record.is_hosting {
                cloud_hosted += 1;
            }
        }
        info!(cloud_hosted, "enrichment complete");
        cloud_hosted
    }
}

/// Walk the plan with the operator, honoring run-all and skip-all.
fn review_queries(queries: Vec<DiscoveryQuery>, prompt: &dyn OperatorPrompt) -> Vec<DiscoveryQuery> {
    let total = queries.len();
    let mut approved = Vec::with_capacity(total);
    let mut run_all = false;
    for (i, query) in queries.into_iter().enumerate() {
        if run_all {
            approved.push(query);
            continue;
        }
        match prompt.review_query(&query, i + 1, total) {
            ReviewDecision::Approve => approved.push(query),
            ReviewDecision::Deny => {}
            ReviewDecision::Modify(new_value) => {
                let original_value = query.value.clone();
                let mut modified = query;
                modified.value = new_value;
                // The raw query no longer matches the edited value
                modified.raw_query = None;
                modified.metadata.insert("modified".to_string(), "true".to_string());
                modified
                    .metadata
                    .insert("original_value".to_string(), original_value);
                approved.push(modified);
            }
            ReviewDecision::RunAll => {
                run_all = true;
                approved.push(query);
            }
            ReviewDecision::SkipAll => break,
        }
    }
    approved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::plugin::{
        DiscoveryResult, HostMetadata, NormalizedHost, Protocol, QueryType,
    };
    use crate::enrich::IpInfoRecord;
    use crate::fingerprint::{FaviconFingerprint, SourceType};
    use crate::hashes::HashBundle;
    use crate::prompt::AutoPrompt;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn normalized(ip: &str, port: u16, source: &str) -> NormalizedHost {
        NormalizedHost {
            ip: ip.to_string(),
            port,
            protocol: Protocol::Http,
            hostname: None,
            source: source.to_string(),
            first_seen: None,
            last_seen: None,
            location: std::collections::BTreeMap::new(),
            metadata: HostMetadata::default(),
        }
    }

    struct ScriptedPlugin {
        name: &'static str,
        hosts: Vec<NormalizedHost>,
        fail_with: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedPlugin {
        fn returning(name: &'static str, hosts: Vec<NormalizedHost>) -> Self {
            Self {
                name,
                hosts,
                fail_with: None,
                calls: AtomicUsize::new(0),
            }
        }
        fn failing(name: &'static str, error: &str) -> Self {
            Self {
                name,
                hosts: Vec::new(),
                fail_with: Some(error.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DiscoveryPlugin for ScriptedPlugin {
        fn name(&self) -> &'static str {
            self.name
        }
        fn description(&self) -> &'static str {
            "scripted plugin for engine tests"
        }
        fn supported_query_types(&self) -> &[QueryType] {
            &[QueryType::FaviconHash, QueryType::TitlePattern]
        }
        fn is_configured(&self) -> bool {
            true
        }
        fn translate_query(&self, query: &DiscoveryQuery) -> Option<String> {
            Some(format!("native:{}", query.value))
        }
        async fn search(
            &self,
            query: &DiscoveryQuery,
            _max_results: Option<usize>,
        ) -> DiscoveryResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(error) => DiscoveryResult::fail(query.clone(), error.clone()),
                None => DiscoveryResult::ok(query.clone(), self.hosts.clone(), self.hosts.len() as u64),
            }
        }
    }

    fn favicon_fingerprint() -> FingerprintSpec {
        let mut spec = FingerprintSpec::new("Example App", SourceType::LiveSite, "http://x");
        spec.favicon = Some(FaviconFingerprint {
            url_path: "/favicon.ico".to_string(),
            hashes: HashBundle {
                mmh3: Some("-12345".to_string()),
                ..Default::default()
            },
            content_type: None,
        });
        spec
    }

    fn engine(dir: &std::path::Path) -> DiscoveryEngine {
        DiscoveryEngine::new(DiscoveryConfig::new().with_cache_dir(dir).with_enrich(false)).unwrap()
    }

    #[tokio::test]
    async fn test_discover_dedupes_across_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(ScriptedPlugin::returning(
                "alpha",
                vec![normalized("1.1.1.1", 80, "alpha")],
            )))
            .unwrap();
        registry
            .register(Arc::new(ScriptedPlugin::returning(
                "beta",
                vec![normalized("1.1.1.1", 80, "beta"), normalized("2.2.2.2", 80, "beta")],
            )))
            .unwrap();

        let summary = engine(dir.path())
            .discover(&favicon_fingerprint(), &registry, &AutoPrompt, None)
            .await
            .unwrap();

        assert_eq!(summary.candidates.len(), 2);
        let first = &summary.candidates[0];
        assert_eq!(first.ip, "1.1.1.1");
        assert_eq!(first.sources, vec!["alpha", "beta"]);
        assert!(!summary.aborted);
    }

    #[tokio::test]
    async fn test_second_run_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new();
        let plugin = Arc::new(ScriptedPlugin::returning(
            "alpha",
            vec![normalized("1.1.1.1", 80, "alpha")],
        ));
        registry.register(plugin.clone()).unwrap();

        let engine = engine(dir.path());
        let fingerprint = favicon_fingerprint();
        let first = engine
            .discover(&fingerprint, &registry, &AutoPrompt, None)
            .await
            .unwrap();
        assert_eq!(first.fresh_queries, 1);
        assert_eq!(first.cached_queries, 0);

        let second = engine
            .discover(&fingerprint, &registry, &AutoPrompt, None)
            .await
            .unwrap();
        assert_eq!(second.fresh_queries, 0);
        assert_eq!(second.cached_queries, 1);
        assert_eq!(second.candidates, first.candidates);
        // The plugin was only consulted once
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_only_never_calls_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new();
        let plugin = Arc::new(ScriptedPlugin::returning("alpha", Vec::new()));
        registry.register(plugin.clone()).unwrap();

        let config = DiscoveryConfig::new()
            .with_cache_dir(dir.path())
            .with_cache_strategy(CacheStrategy::CacheOnly)
            .with_enrich(false);
        let summary = DiscoveryEngine::new(config)
            .unwrap()
            .discover(&favicon_fingerprint(), &registry, &AutoPrompt, None)
            .await
            .unwrap();

        assert!(summary.candidates.is_empty());
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plugin_error_aborts_with_batch_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(ScriptedPlugin::failing("alpha", "upstream 500")))
            .unwrap();

        let summary = engine(dir.path())
            .discover(&favicon_fingerprint(), &registry, &AutoPrompt, None)
            .await
            .unwrap();
        assert!(summary.aborted);
        assert!(summary.candidates.is_empty());
    }

    struct ContinuePrompt;
    impl OperatorPrompt for ContinuePrompt {
        fn review_query(
            &self,
            _query: &DiscoveryQuery,
            _index: usize,
            _total: usize,
        ) -> ReviewDecision {
            ReviewDecision::Approve
        }
        fn continue_after_error(&self, _error: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_plugin_error_continues_when_operator_says_so() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(ScriptedPlugin::failing("alpha", "upstream 500")))
            .unwrap();
        registry
            .register(Arc::new(ScriptedPlugin::returning(
                "beta",
                vec![normalized("2.2.2.2", 80, "beta")],
            )))
            .unwrap();

        let summary = engine(dir.path())
            .discover(&favicon_fingerprint(), &registry, &ContinuePrompt, None)
            .await
            .unwrap();
        assert!(!summary.aborted);
        assert_eq!(summary.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_max_candidates_truncates_after_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(ScriptedPlugin::returning(
                "alpha",
                vec![
                    normalized("1.1.1.1", 80, "alpha"),
                    normalized("1.1.1.1", 80, "alpha"),
                    normalized("2.2.2.2", 80, "alpha"),
                    normalized("3.3.3.3", 80, "alpha"),
                ],
            )))
            .unwrap();

        let config = DiscoveryConfig::new()
            .with_cache_dir(dir.path())
            .with_max_candidates(Some(2))
            .with_enrich(false);
        let summary = DiscoveryEngine::new(config)
            .unwrap()
            .discover(&favicon_fingerprint(), &registry, &AutoPrompt, None)
            .await
            .unwrap();
        // Duplicates folded before the cap applies
        assert_eq!(summary.candidates.len(), 2);
        assert_eq!(summary.candidates[0].ip, "1.1.1.1");
        assert_eq!(summary.candidates[1].ip, "2.2.2.2");
    }

    struct FakeEnricher {
        looked_up: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IpLookup for FakeEnricher {
        async fn lookup(&self, ip: &str) -> IpInfoRecord {
            self.looked_up.lock().unwrap().push(ip.to_string());
            IpInfoRecord {
                ip: ip.to_string(),
                country: Some("DE".to_string()),
                company: Some("Hetzner Online GmbH".to_string()),
                asn: Some("AS24940".to_string()),
                is_hosting: true,
                hosting_provider: Some("Hetzner".to_string()),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn test_enrichment_fills_only_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new();
        let mut discovered = normalized("1.1.1.1", 80, "alpha");
        discovered.metadata.org = Some("Original Org".to_string());
        registry
            .register(Arc::new(ScriptedPlugin::returning("alpha", vec![discovered])))
            .unwrap();

        let config = DiscoveryConfig::new().with_cache_dir(dir.path());
        let enricher = FakeEnricher {
            looked_up: Mutex::new(Vec::new()),
        };
        let summary = DiscoveryEngine::new(config)
            .unwrap()
            .discover(&favicon_fingerprint(), &registry, &AutoPrompt, Some(&enricher))
            .await
            .unwrap();

        assert_eq!(summary.cloud_hosted, 1);
        let candidate = &summary.candidates[0];
        // Discovery data wins
        assert_eq!(candidate.organization.as_deref(), Some("Original Org"));
        // Empty fields filled
        assert_eq!(candidate.asn.as_deref(), Some("AS24940"));
        assert_eq!(candidate.hosting_provider.as_deref(), Some("Hetzner"));
        assert!(candidate.is_cloud_hosted);
        assert!(candidate.enriched_at.is_some());
        assert_eq!(
            candidate.location.as_ref().unwrap().get("country").unwrap(),
            "DE"
        );
        assert_eq!(*enricher.looked_up.lock().unwrap(), vec!["1.1.1.1"]);
    }

    struct ScriptedReview {
        decisions: Mutex<Vec<ReviewDecision>>,
    }

    impl OperatorPrompt for ScriptedReview {
        fn review_query(&self, _q: &DiscoveryQuery, _i: usize, _t: usize) -> ReviewDecision {
            self.decisions.lock().unwrap().remove(0)
        }
        fn continue_after_error(&self, _error: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_review_modify_clears_raw_query_and_marks_metadata() {
        let mut query = DiscoveryQuery::new(QueryType::TitlePattern, "Original Title");
        query.raw_query = Some("native:something".to_string());
        let prompt = ScriptedReview {
            decisions: Mutex::new(vec![ReviewDecision::Modify("Better Title".to_string())]),
        };
        let approved = review_queries(vec![query], &prompt);
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].value, "Better Title");
        assert!(approved[0].raw_query.is_none());
        assert_eq!(approved[0].metadata.get("modified").unwrap(), "true");
        assert_eq!(approved[0].metadata.get("original_value").unwrap(), "Original Title");
    }

    #[test]
    fn test_review_run_all_and_skip_all() {
        let queries: Vec<DiscoveryQuery> = (0..4)
            .map(|i| DiscoveryQuery::new(QueryType::TitlePattern, format!("q{i}")))
            .collect();

        let prompt = ScriptedReview {
            decisions: Mutex::new(vec![ReviewDecision::Deny, ReviewDecision::RunAll]),
        };
        let approved = review_queries(queries.clone(), &prompt);
        assert_eq!(approved.len(), 3);

        let prompt = ScriptedReview {
            decisions: Mutex::new(vec![ReviewDecision::Approve, ReviewDecision::SkipAll]),
        };
        let approved = review_queries(queries, &prompt);
        assert_eq!(approved.len(), 1);
    }
}
