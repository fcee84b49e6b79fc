//! The discovery plugin contract.
//!
//! Every Internet-scan search service is wrapped in a plugin implementing
//! [`DiscoveryPlugin`]. Plugins receive normalized [`DiscoveryQuery`]
//! values, translate them to their native syntax, and return
//! [`NormalizedHost`] records so the engine can aggregate and deduplicate
//! across sources without knowing any service's schema.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Type of discovery query (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Favicon MMH3 hash lookup
    FaviconHash,
    /// Image hash lookup (MMH3 or MD5, source-dependent)
    ImageHash,
    /// Page title substring/phrase
    TitlePattern,
    /// Response body substring/phrase
    BodyPattern,
    /// HTTP header substring
    HeaderPattern,
    /// Known endpoint path
    Endpoint,
    /// Raw source-native query, passed through untranslated
    Custom,
}

impl QueryType {
    /// Static ranking used by the planner; higher is more reliable.
    #[must_use]
    pub fn priority(self) -> u32 {
        match self {
            Self::FaviconHash => 100,
            Self::ImageHash => 80,
            Self::TitlePattern => 60,
            Self::BodyPattern => 40,
            Self::HeaderPattern => 20,
            Self::Endpoint | Self::Custom => 0,
        }
    }

    /// Wire name, as used in cache keys and serialized documents.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::FaviconHash => "favicon_hash",
            Self::ImageHash => "image_hash",
            Self::TitlePattern => "title_pattern",
            Self::BodyPattern => "body_pattern",
            Self::HeaderPattern => "header_pattern",
            Self::Endpoint => "endpoint",
            Self::Custom => "custom",
        }
    }
}

/// Normalized query handed to every plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    /// What kind of signal this query searches for
    pub query_type: QueryType,
    /// The search value (hash, phrase, path)
    pub value: String,
    /// Source-native query; when set, `translate_query` returns it verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_query: Option<String>,
    /// Planner bookkeeping: signal source, alternate hash values, review
    /// markers. String-valued so it serializes flat.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DiscoveryQuery {
    /// Create a query with empty metadata
    #[must_use]
    pub fn new(query_type: QueryType, value: impl Into<String>) -> Self {
        Self {
            query_type,
            value: value.into(),
            raw_query: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The label shown next to this query in logs: the planner's `source`
    /// tag when present, otherwise the wire name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.metadata
            .get("source")
            .map_or_else(|| self.query_type.wire_name(), String::as_str)
    }

    /// The canonical `<query_type>:<value>` string the cache key is
    /// derived from. Deliberately independent of any plugin's translated
    /// syntax so translation changes do not invalidate cached results.
    #[must_use]
    pub fn cache_string(&self) -> String {
        format!("{}:{}", self.query_type.wire_name(), self.value)
    }
}

impl std::fmt::Display for DiscoveryQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value: String = self.value.chars().take(50).collect();
        write!(f, "{}:{value}", self.query_type.wire_name())
    }
}

/// Protocol a discovered service speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// Source-specific extras every plugin maps into the same three slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetadata {
    /// Autonomous system number, `AS` prefixed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    /// Organization that announces the address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// All hostnames the source associates with the address
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
}

/// Normalized host result: the standard output format every discovery
/// plugin must produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedHost {
    /// IP address
    pub ip: String,
    /// Port number
    pub port: u16,
    /// Protocol the service was observed speaking
    #[serde(default)]
    pub protocol: Protocol,
    /// Best-known hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Name of the plugin that found this host
    pub source: String,
    /// When the source first observed the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    /// When the source last observed the service (ISO-8601 UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    /// Geographic fields; only populated keys appear
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub location: BTreeMap<String, String>,
    /// Network ownership extras
    #[serde(default, skip_serializing_if = "host_metadata_is_empty")]
    pub metadata: HostMetadata,
}

fn host_metadata_is_empty(metadata: &HostMetadata) -> bool {
    metadata.asn.is_none() && metadata.org.is_none() && metadata.hostnames.is_empty()
}

impl NormalizedHost {
    /// Service URL, omitting the default port for the protocol
    #[must_use]
    pub fn url(&self) -> String {
        let host = self.hostname.as_deref().unwrap_or(&self.ip);
        let default_port = match self.protocol {
            Protocol::Http => 80,
            Protocol::Https => 443,
        };
        if self.port == default_port {
            format!("{}://{host}", self.protocol)
        } else {
            format!("{}://{host}:{}", self.protocol, self.port)
        }
    }

    /// Deduplication identity
    #[must_use]
    pub fn unique_key(&self) -> (String, u16) {
        (self.ip.clone(), self.port)
    }
}

/// Result of one discovery query against one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// The originating query
    pub query: DiscoveryQuery,
    /// Hosts found, in source order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<NormalizedHost>,
    /// Total matches the source reports, which may exceed what was returned
    #[serde(default)]
    pub total_available: u64,
    /// Error message; its absence defines success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiscoveryResult {
    /// Successful result
    #[must_use]
    pub fn ok(query: DiscoveryQuery, hosts: Vec<NormalizedHost>, total_available: u64) -> Self {
        Self {
            query,
            hosts,
            total_available,
            error: None,
        }
    }

    /// Failed result; `hosts` may still carry partial results gathered
    /// before the failure (rate-limited pagination does this).
    #[must_use]
    pub fn fail(query: DiscoveryQuery, error: impl Into<String>) -> Self {
        Self {
            query,
            hosts: Vec::new(),
            total_available: 0,
            error: Some(error.into()),
        }
    }

    /// Whether the query succeeded
    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Number of hosts returned
    #[must_use]
    pub fn count(&self) -> usize {
        self.hosts.len()
    }
}

/// A discovery source adapter.
///
/// Implementations live in their own crates (`hostprint-shodan`,
/// `hostprint-censys`, …) and are registered explicitly at startup:
///
/// ```rust,ignore
/// let registry = PluginRegistry::new();
/// registry.register(Arc::new(ShodanPlugin::from_env()))?;
/// ```
#[async_trait]
pub trait DiscoveryPlugin: Send + Sync {
    /// Unique plugin name, e.g. `"shodan"`
    fn name(&self) -> &'static str;

    /// Human-readable description of the source
    fn description(&self) -> &'static str;

    /// Query types this source can answer
    fn supported_query_types(&self) -> &[QueryType];

    /// Whether credentials are present. Unconfigured plugins stay
    /// registered but are skipped by the engine.
    fn is_configured(&self) -> bool;

    /// Lower a normalized query to source-native syntax. Returns the
    /// `raw_query` verbatim when set, and `None` when the query cannot be
    /// expressed (e.g. an image query lacking the hash this source needs).
    fn translate_query(&self, query: &DiscoveryQuery) -> Option<String>;

    /// Execute the query. Recoverable failures are reported through
    /// [`DiscoveryResult::error`], never as a panic or a process abort.
    async fn search(&self, query: &DiscoveryQuery, max_results: Option<usize>) -> DiscoveryResult;

    /// Whether this plugin supports a query type
    fn supports_query_type(&self, query_type: QueryType) -> bool {
        self.supported_query_types().contains(&query_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(QueryType::FaviconHash.priority() > QueryType::ImageHash.priority());
        assert!(QueryType::ImageHash.priority() > QueryType::TitlePattern.priority());
        assert!(QueryType::TitlePattern.priority() > QueryType::BodyPattern.priority());
        assert!(QueryType::BodyPattern.priority() > QueryType::HeaderPattern.priority());
    }

    #[test]
    fn test_query_cache_string() {
        let query = DiscoveryQuery::new(QueryType::FaviconHash, "-12345");
        assert_eq!(query.cache_string(), "favicon_hash:-12345");
    }

    #[test]
    fn test_query_label_prefers_source_tag() {
        let query = DiscoveryQuery::new(QueryType::TitlePattern, "DVWA");
        assert_eq!(query.label(), "title_pattern");
        let tagged = query.with_metadata("source", "title");
        assert_eq!(tagged.label(), "title");
    }

    #[test]
    fn test_host_url_omits_default_ports() {
        let mut host = NormalizedHost {
            ip: "1.2.3.4".to_string(),
            port: 80,
            protocol: Protocol::Http,
            hostname: None,
            source: "shodan".to_string(),
            first_seen: None,
            last_seen: None,
            location: BTreeMap::new(),
            metadata: HostMetadata::default(),
        };
        assert_eq!(host.url(), "http://1.2.3.4");
        host.port = 8080;
        assert_eq!(host.url(), "http://1.2.3.4:8080");
        host.protocol = Protocol::Https;
        host.port = 443;
        host.hostname = Some("example.com".to_string());
        assert_eq!(host.url(), "https://example.com");
    }

    #[test]
    fn test_result_success() {
        let query = DiscoveryQuery::new(QueryType::BodyPattern, "powered by Example");
        assert!(DiscoveryResult::ok(query.clone(), Vec::new(), 0).success());
        assert!(!DiscoveryResult::fail(query, "boom").success());
    }
}
