//! # Shodan Discovery Plugin
//!
//! Searches Shodan for hosts matching fingerprint signals. Supports
//! favicon hashes (MMH3), title patterns, body patterns, headers, and
//! raw Shodan-syntax queries.
//!
//! ## Configuration
//!
//! Set `SHODAN_API_KEY`. Without it the plugin stays registered but
//! reports itself unconfigured and is skipped by the discovery engine.
//!
//! ## Pagination
//!
//! Shodan serves 100 results per page. The plugin walks pages one at a
//! time, sleeping at least a second between requests, and stops cleanly
//! on HTTP 429. Results gathered before the rate limit flow out with the
//! error so a capped account still produces candidates.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hostprint::discovery::{DiscoveryQuery, PluginRegistry, QueryType};
//! use hostprint_shodan::ShodanPlugin;
//! use std::sync::Arc;
//!
//! # async fn run() -> hostprint::Result<()> {
//! let registry = PluginRegistry::new();
//! registry.register(Arc::new(ShodanPlugin::from_env()))?;
//!
//! let plugin = registry.get("shodan").unwrap();
//! let result = plugin
//!     .search(&DiscoveryQuery::new(QueryType::FaviconHash, "-231109625"), Some(100))
//!     .await;
//! println!("{} hosts", result.count());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use hostprint::discovery::{
    DiscoveryPlugin, DiscoveryQuery, DiscoveryResult, HostMetadata, NormalizedHost, Protocol,
    QueryType,
};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.shodan.io";
const PAGE_SIZE: usize = 100;
const INTER_PAGE_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SUPPORTED: [QueryType; 5] = [
    QueryType::FaviconHash,
    QueryType::TitlePattern,
    QueryType::BodyPattern,
    QueryType::HeaderPattern,
    QueryType::Custom,
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<Match>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Match {
    #[serde(default)]
    ip_str: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    ssl: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    hostnames: Vec<String>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    asn: Option<String>,
    #[serde(default)]
    org: Option<String>,
}

fn default_port() -> u16 {
    80
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region_code: Option<String>,
}

/// Shodan discovery plugin.
pub struct ShodanPlugin {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl ShodanPlugin {
    /// Create a plugin with an explicit API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::build(Some(api_key.into()), DEFAULT_BASE_URL.to_string())
    }

    /// Create a plugin from the `SHODAN_API_KEY` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::build(std::env::var("SHODAN_API_KEY").ok(), DEFAULT_BASE_URL.to_string())
    }

    /// Point the plugin at a different API endpoint (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build(api_key: Option<String>, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.filter(|key| !key.is_empty()),
            base_url,
            client,
        }
    }

    async fn fetch_page(
        &self,
        api_key: &str,
        native_query: &str,
        page: usize,
    ) -> Result<SearchResponse, PageError> {
        let url = format!("{}/shodan/host/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", api_key),
                ("query", native_query),
                ("page", &page.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PageError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json::<SearchResponse>()
                .await
                .map_err(|e| PageError::Transport(format!("malformed response: {e}"))),
            429 => Err(PageError::RateLimited),
            401 => Err(PageError::Fatal("Shodan authentication failed (HTTP 401)".to_string())),
            status => Err(PageError::Fatal(format!("Shodan API error: HTTP {status}"))),
        }
    }

    fn normalize(host: &Match) -> NormalizedHost {
        let protocol = if host.ssl.is_some() || host.port == 443 {
            Protocol::Https
        } else {
            Protocol::Http
        };
        let mut location = BTreeMap::new();
        if let Some(loc) = &host.location {
            if let Some(country) = &loc.country_name {
                location.insert("country".to_string(), country.clone());
            }
            if let Some(code) = &loc.country_code {
                location.insert("country_code".to_string(), code.clone());
            }
            if let Some(city) = &loc.city {
                location.insert("city".to_string(), city.clone());
            }
            if let Some(region) = &loc.region_code {
                location.insert("region".to_string(), region.clone());
            }
        }
        NormalizedHost {
            ip: host.ip_str.clone(),
            port: host.port,
            protocol,
            hostname: host.hostnames.first().cloned(),
            source: "shodan".to_string(),
            first_seen: None,
            last_seen: host.timestamp.clone(),
            location,
            metadata: HostMetadata {
                asn: host.asn.clone(),
                org: host.org.clone(),
                hostnames: host.hostnames.clone(),
            },
        }
    }
}

enum PageError {
    RateLimited,
    Transport(String),
    Fatal(String),
}

#[async_trait]
impl DiscoveryPlugin for ShodanPlugin {
    fn name(&self) -> &'static str {
        "shodan"
    }

    fn description(&self) -> &'static str {
        "Shodan search engine for Internet-connected devices"
    }

    fn supported_query_types(&self) -> &[QueryType] {
        &SUPPORTED
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn translate_query(&self, query: &DiscoveryQuery) -> Option<String> {
        if let Some(raw) = &query.raw_query {
            return Some(raw.clone());
        }
        let value = &query.value;
        Some(match query.query_type {
            QueryType::FaviconHash | QueryType::ImageHash => format!("http.favicon.hash:{value}"),
            QueryType::TitlePattern => format!("http.title:\"{value}\""),
            QueryType::HeaderPattern => format!("http.headers:\"{value}\""),
            QueryType::Custom => value.clone(),
            // Default: search in the HTML body
            QueryType::BodyPattern | QueryType::Endpoint => format!("http.html:\"{value}\""),
        })
    }

    async fn search(&self, query: &DiscoveryQuery, max_results: Option<usize>) -> DiscoveryResult {
        let Some(api_key) = self.api_key.clone() else {
            return DiscoveryResult::fail(query.clone(), "Shodan API key not configured");
        };
        let Some(native_query) = self.translate_query(query) else {
            return DiscoveryResult::fail(query.clone(), "query cannot be translated");
        };
        debug!(query = %native_query, "shodan search");

        let mut hosts: Vec<NormalizedHost> = Vec::new();
        let mut total_available: u64 = 0;
        let mut page = 1;

        loop {
            if page > 1 {
                // Shodan rejects bursts; one page per second
                tokio::time::sleep(INTER_PAGE_DELAY).await;
            }
            let response = match self.fetch_page(&api_key, &native_query, page).await {
                Ok(response) => response,
                Err(PageError::RateLimited) => {
                    debug!(page, collected = hosts.len(), "shodan rate limit reached");
                    // Partial results still flow out alongside the error
                    return DiscoveryResult {
                        query: query.clone(),
                        hosts,
                        total_available,
                        error: Some("Shodan rate limit exceeded (HTTP 429)".to_string()),
                    };
                }
                Err(PageError::Transport(message)) if page > 1 => {
                    debug!(page, error = %message, "page fetch failed, keeping earlier pages");
                    break;
                }
                Err(PageError::Transport(message)) | Err(PageError::Fatal(message)) => {
                    return DiscoveryResult {
                        query: query.clone(),
                        hosts,
                        total_available,
                        error: Some(message),
                    };
                }
            };

            if page == 1 {
                total_available = response.total;
            }
            if response.matches.is_empty() {
                break;
            }
            for item in &response.matches {
                hosts.push(Self::normalize(item));
                if max_results.is_some_and(|max| hosts.len() >= max) {
                    return DiscoveryResult::ok(query.clone(), hosts, total_available);
                }
            }

            let target = match max_results {
                Some(max) => (max as u64).min(total_available),
                None => total_available,
            };
            if hosts.len() as u64 >= target || response.matches.len() < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        DiscoveryResult::ok(query.clone(), hosts, total_available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> ShodanPlugin {
        ShodanPlugin::new("test-key")
    }

    #[test]
    fn test_translations() {
        let plugin = plugin();
        let cases = [
            (QueryType::FaviconHash, "-12345", "http.favicon.hash:-12345"),
            (QueryType::TitlePattern, "DVWA", "http.title:\"DVWA\""),
            (QueryType::BodyPattern, "powered by X", "http.html:\"powered by X\""),
            (QueryType::HeaderPattern, "X-App: x", "http.headers:\"X-App: x\""),
            (QueryType::Custom, "port:8443 org:\"Y\"", "port:8443 org:\"Y\""),
        ];
        for (query_type, value, expected) in cases {
            let query = DiscoveryQuery::new(query_type, value);
            assert_eq!(plugin.translate_query(&query).as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_raw_query_passes_through_verbatim() {
        let plugin = plugin();
        let mut query = DiscoveryQuery::new(QueryType::FaviconHash, "-1");
        query.raw_query = Some("http.favicon.hash:-1 country:DE".to_string());
        assert_eq!(
            plugin.translate_query(&query).as_deref(),
            Some("http.favicon.hash:-1 country:DE")
        );
    }

    #[test]
    fn test_unconfigured_without_key() {
        let plugin = ShodanPlugin::build(None, DEFAULT_BASE_URL.to_string());
        assert!(!plugin.is_configured());
        let empty = ShodanPlugin::build(Some(String::new()), DEFAULT_BASE_URL.to_string());
        assert!(!empty.is_configured());
    }

    #[test]
    fn test_normalize_protocol_and_metadata() {
        let item = Match {
            ip_str: "1.2.3.4".to_string(),
            port: 8443,
            ssl: Some(serde_json::json!({})),
            timestamp: Some("2025-06-01T00:00:00.000000".to_string()),
            hostnames: vec!["a.example".to_string(), "b.example".to_string()],
            location: Some(Location {
                country_name: Some("Germany".to_string()),
                country_code: Some("DE".to_string()),
                city: None,
                region_code: None,
            }),
            asn: Some("AS64496".to_string()),
            org: Some("Example Org".to_string()),
        };
        let host = ShodanPlugin::normalize(&item);
        assert_eq!(host.protocol, Protocol::Https);
        assert_eq!(host.hostname.as_deref(), Some("a.example"));
        assert_eq!(host.location.get("country").unwrap(), "Germany");
        assert!(!host.location.contains_key("city"));
        assert_eq!(host.metadata.hostnames.len(), 2);
        assert_eq!(host.source, "shodan");
    }
}
