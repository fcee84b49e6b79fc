//! # Censys Discovery Plugin
//!
//! Searches the Censys Platform API using CenQL. Favicon queries search
//! both the web-property and host namespaces for broader coverage; image
//! queries use the MD5 favicon field (Censys does not index MMH3 for
//! arbitrary images).
//!
//! ## Configuration
//!
//! Set `CENSYS_PERSONAL_ACCESS_TOKEN` (required) and `CENSYS_ORG_ID`
//! (required on Starter/Enterprise tiers).
//!
//! ## Rate limiting
//!
//! The upstream contract allows **one concurrent action**. A process-wide
//! gate serializes every request made by every instance of this plugin:
//! an async mutex is held across the in-flight request, and a monotonic
//! last-request instant enforces a minimum one-second spacing between
//! request starts. Workers elsewhere in the process cannot overlap
//! Censys calls, no matter how many plugin instances exist.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hostprint::discovery::{
    DiscoveryPlugin, DiscoveryQuery, DiscoveryResult, HostMetadata, NormalizedHost, Protocol,
    QueryType,
};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.platform.censys.io/v3/global";
const SEARCH_ENDPOINT: &str = "/search/query";
const MAX_PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 10;
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SUPPORTED: [QueryType; 6] = [
    QueryType::FaviconHash,
    QueryType::ImageHash,
    QueryType::TitlePattern,
    QueryType::BodyPattern,
    QueryType::HeaderPattern,
    QueryType::Custom,
];

/// Process-wide single-request gate. Held across the in-flight request;
/// the instant inside only moves forward.
static REQUEST_GATE: LazyLock<Mutex<Option<Instant>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    total_hits: u64,
    #[serde(default)]
    hits: Vec<Hit>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(default)]
    webproperty_v1: Option<Resource>,
    #[serde(default)]
    host_v1: Option<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    resource: ResourceBody,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceBody {
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    dns: Option<Dns>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    autonomous_system: Option<AutonomousSystem>,
    #[serde(default)]
    services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct Dns {
    #[serde(default)]
    reverse_dns: Option<ReverseDns>,
}

#[derive(Debug, Deserialize)]
struct ReverseDns {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    province: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AutonomousSystem {
    #[serde(default)]
    asn: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    tls: Option<serde_json::Value>,
    #[serde(default)]
    scan_time: Option<String>,
}

/// Censys Platform discovery plugin.
pub struct CensysPlugin {
    personal_access_token: Option<String>,
    organization_id: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl CensysPlugin {
    /// Create a plugin with explicit credentials.
    #[must_use]
    pub fn new(personal_access_token: impl Into<String>, organization_id: Option<String>) -> Self {
        Self::build(
            Some(personal_access_token.into()),
            organization_id,
            DEFAULT_BASE_URL.to_string(),
        )
    }

    /// Create a plugin from `CENSYS_PERSONAL_ACCESS_TOKEN` and
    /// `CENSYS_ORG_ID`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::build(
            std::env::var("CENSYS_PERSONAL_ACCESS_TOKEN").ok(),
            std::env::var("CENSYS_ORG_ID").ok(),
            DEFAULT_BASE_URL.to_string(),
        )
    }

    /// Point the plugin at a different API endpoint (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build(token: Option<String>, organization_id: Option<String>, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            personal_access_token: token.filter(|t| !t.is_empty()),
            organization_id,
            base_url,
            client,
        }
    }

    /// One gated POST to the search endpoint. The gate is held until the
    /// response arrives, so no second request can start, and request
    /// starts are at least [`MIN_REQUEST_INTERVAL`] apart.
    async fn gated_search_request(
        &self,
        token: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut gate = REQUEST_GATE.lock().await;
        if let Some(last) = *gate {
            let since = last.elapsed();
            if since < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - since).await;
            }
        }
        *gate = Some(Instant::now());

        let mut request = self
            .client
            .post(format!("{}{SEARCH_ENDPOINT}", self.base_url))
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(body);
        if let Some(org) = &self.organization_id {
            request = request.header("X-Organization-ID", org);
        }
        request.send().await
        // gate drops here, after the response
    }

    fn normalize(body: &ResourceBody) -> Vec<NormalizedHost> {
        let mut ip = body.ip.clone();
        let mut hostname = None;
        let mut hostnames: Vec<String> = Vec::new();
        let mut endpoint_port = None;

        // Web properties carry their address inside the endpoint list
        for endpoint in &body.endpoints {
            if let Some(endpoint_ip) = &endpoint.ip {
                ip = Some(endpoint_ip.clone());
                hostname = endpoint.hostname.clone();
                hostnames = hostname.iter().cloned().collect();
                endpoint_port = endpoint.port;
                break;
            }
        }

        if let Some(reverse) = body.dns.as_ref().and_then(|dns| dns.reverse_dns.as_ref()) {
            if !reverse.names.is_empty() {
                hostname = reverse.names.first().cloned();
                hostnames = reverse.names.clone();
            }
        }

        let Some(ip) = ip else {
            return Vec::new();
        };

        let mut location = BTreeMap::new();
        if let Some(loc) = &body.location {
            if let Some(country) = &loc.country {
                location.insert("country".to_string(), country.clone());
            }
            if let Some(code) = &loc.country_code {
                location.insert("country_code".to_string(), code.clone());
            }
            if let Some(city) = &loc.city {
                location.insert("city".to_string(), city.clone());
            }
            if let Some(province) = &loc.province {
                location.insert("region".to_string(), province.clone());
            }
        }

        let (asn, org) = body.autonomous_system.as_ref().map_or((None, None), |autonomous| {
            (
                autonomous.asn.map(|asn| format!("AS{asn}")),
                autonomous.name.clone().or_else(|| autonomous.description.clone()),
            )
        });
        let metadata = HostMetadata {
            asn,
            org,
            hostnames: hostnames.clone(),
        };

        let make_host = |port: u16, https: bool, last_seen: Option<String>| NormalizedHost {
            ip: ip.clone(),
            port,
            protocol: if https { Protocol::Https } else { Protocol::Http },
            hostname: hostname.clone(),
            source: "censys".to_string(),
            first_seen: None,
            last_seen,
            location: location.clone(),
            metadata: metadata.clone(),
        };

        let mut hosts: Vec<NormalizedHost> = body
            .services
            .iter()
            .map(|service| {
                let port = service.port.unwrap_or(80);
                let https = service.tls.is_some() || matches!(port, 443 | 8443);
                make_host(port, https, service.scan_time.clone())
            })
            .collect();

        if hosts.is_empty() {
            let port = endpoint_port.unwrap_or(80);
            hosts.push(make_host(port, matches!(port, 443 | 8443), None));
        }
        hosts
    }
}

#[async_trait]
impl DiscoveryPlugin for CensysPlugin {
    fn name(&self) -> &'static str {
        "censys"
    }

    fn description(&self) -> &'static str {
        "Censys search engine (Platform API)"
    }

    fn supported_query_types(&self) -> &[QueryType] {
        &SUPPORTED
    }

    fn is_configured(&self) -> bool {
        self.personal_access_token.is_some()
    }

    fn translate_query(&self, query: &DiscoveryQuery) -> Option<String> {
        if let Some(raw) = &query.raw_query {
            return Some(raw.clone());
        }
        let value = &query.value;
        match query.query_type {
            // Both namespaces, for maximum coverage
            QueryType::FaviconHash => Some(format!(
                "(web.endpoints.http.favicons.hash_shodan: \"{value}\") OR \
                 (host.services.endpoints.http.favicons.hash_shodan: \"{value}\")"
            )),
            // Censys indexes image MD5s on the favicon field; without an
            // MD5 in the query metadata there is nothing to search
            QueryType::ImageHash => query
                .metadata
                .get("md5")
                .map(|md5| format!("web.endpoints.http.favicons.hash_md5: \"{md5}\"")),
            QueryType::TitlePattern => {
                Some(format!("web.endpoints.http.html_title: \"{value}\""))
            }
            QueryType::HeaderPattern => Some(format!("web.endpoints.http.headers: \"{value}\"")),
            QueryType::Custom => Some(value.clone()),
            QueryType::BodyPattern | QueryType::Endpoint => {
                Some(format!("web.endpoints.http.body: \"{value}\""))
            }
        }
    }

    async fn search(&self, query: &DiscoveryQuery, max_results: Option<usize>) -> DiscoveryResult {
        let Some(token) = self.personal_access_token.clone() else {
            return DiscoveryResult::fail(
                query.clone(),
                "Censys credentials not configured. Set CENSYS_PERSONAL_ACCESS_TOKEN.",
            );
        };
        let Some(censys_query) = self.translate_query(query) else {
            return DiscoveryResult::fail(
                query.clone(),
                format!(
                    "query type {} requires metadata not available",
                    query.query_type.wire_name()
                ),
            );
        };
        debug!(query = %censys_query, "censys search");

        let mut hosts: Vec<NormalizedHost> = Vec::new();
        let mut total_available: u64 = 0;
        let mut page_token: Option<String> = None;
        let mut effective_max = max_results;

        for page in 1..=MAX_PAGES {
            let remaining = effective_max.map_or(MAX_PAGE_SIZE, |max| max.saturating_sub(hosts.len()));
            let page_size = remaining.min(MAX_PAGE_SIZE);
            if page_size == 0 {
                break;
            }

            let mut body = serde_json::json!({
                "query": censys_query,
                "page_size": page_size,
            });
            if let Some(token) = &page_token {
                body["page_token"] = serde_json::Value::String(token.clone());
            }

            let response = match self.gated_search_request(&token, &body).await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return DiscoveryResult {
                        query: query.clone(),
                        hosts,
                        total_available,
                        error: Some("Censys API request timed out".to_string()),
                    }
                }
                Err(e) => {
                    return DiscoveryResult {
                        query: query.clone(),
                        hosts,
                        total_available,
                        error: Some(format!("Censys API request failed: {e}")),
                    }
                }
            };

            match response.status().as_u16() {
                200 => {}
                401 => {
                    return DiscoveryResult::fail(
                        query.clone(),
                        "Censys authentication failed. Check your CENSYS_PERSONAL_ACCESS_TOKEN.",
                    )
                }
                403 => {
                    return DiscoveryResult::fail(
                        query.clone(),
                        "Censys access denied. Ensure you have the API Access role and a valid organization ID.",
                    )
                }
                422 => {
                    let detail = response
                        .json::<serde_json::Value>()
                        .await
                        .ok()
                        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
                        .unwrap_or_else(|| "query error".to_string());
                    return DiscoveryResult::fail(query.clone(), format!("Censys query error: {detail}"));
                }
                429 => {
                    return DiscoveryResult {
                        query: query.clone(),
                        hosts,
                        total_available,
                        error: Some("Censys rate limit exceeded. Try again later.".to_string()),
                    }
                }
                status => {
                    return DiscoveryResult::fail(
                        query.clone(),
                        format!("Censys API error: HTTP {status}"),
                    )
                }
            }

            let parsed: SearchResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    return DiscoveryResult {
                        query: query.clone(),
                        hosts,
                        total_available,
                        error: Some(format!("Censys response unparseable: {e}")),
                    }
                }
            };

            if page == 1 {
                total_available = parsed.result.total_hits;
                if effective_max.is_none() {
                    effective_max = Some(total_available as usize);
                }
            }

            if parsed.result.hits.is_empty() {
                break;
            }
            'hits: for hit in &parsed.result.hits {
                let resource = hit.webproperty_v1.as_ref().or(hit.host_v1.as_ref());
                if let Some(resource) = resource {
                    for host in Self::normalize(&resource.resource) {
                        hosts.push(host);
                        if effective_max.is_some_and(|max| hosts.len() >= max) {
                            break 'hits;
                        }
                    }
                }
            }

            match parsed.result.next_page_token {
                Some(token)
                    if effective_max.map_or(true, |max| hosts.len() < max) =>
                {
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        if let Some(max) = effective_max {
            hosts.truncate(max);
        }
        DiscoveryResult::ok(query.clone(), hosts, total_available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> CensysPlugin {
        CensysPlugin::new("test-token", Some("org-123".to_string()))
    }

    #[test]
    fn test_favicon_translation_covers_both_namespaces() {
        let query = DiscoveryQuery::new(QueryType::FaviconHash, "-12345");
        let translated = plugin().translate_query(&query).unwrap();
        assert!(translated.contains("web.endpoints.http.favicons.hash_shodan: \"-12345\""));
        assert!(translated.contains("host.services.endpoints.http.favicons.hash_shodan: \"-12345\""));
        assert!(translated.contains(" OR "));
    }

    #[test]
    fn test_image_translation_requires_md5() {
        let bare = DiscoveryQuery::new(QueryType::ImageHash, "111222333");
        assert!(plugin().translate_query(&bare).is_none());

        let with_md5 = bare.with_metadata("md5", "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            plugin().translate_query(&with_md5).as_deref(),
            Some("web.endpoints.http.favicons.hash_md5: \"d41d8cd98f00b204e9800998ecf8427e\"")
        );
    }

    #[test]
    fn test_title_body_and_custom_translations() {
        let title = DiscoveryQuery::new(QueryType::TitlePattern, "DVWA");
        assert_eq!(
            plugin().translate_query(&title).as_deref(),
            Some("web.endpoints.http.html_title: \"DVWA\"")
        );
        let body = DiscoveryQuery::new(QueryType::BodyPattern, "powered by X");
        assert_eq!(
            plugin().translate_query(&body).as_deref(),
            Some("web.endpoints.http.body: \"powered by X\"")
        );
        let custom = DiscoveryQuery::new(QueryType::Custom, "host.services.port: 8443");
        assert_eq!(
            plugin().translate_query(&custom).as_deref(),
            Some("host.services.port: 8443")
        );
    }

    #[test]
    fn test_unconfigured_without_token() {
        let plugin = CensysPlugin::build(None, None, DEFAULT_BASE_URL.to_string());
        assert!(!plugin.is_configured());
    }

    #[test]
    fn test_normalize_prefers_service_ports() {
        let body = ResourceBody {
            ip: Some("1.2.3.4".to_string()),
            dns: Some(Dns {
                reverse_dns: Some(ReverseDns {
                    names: vec!["a.example".to_string()],
                }),
            }),
            endpoints: Vec::new(),
            location: None,
            autonomous_system: Some(AutonomousSystem {
                asn: Some(64496),
                name: Some("Example".to_string()),
                description: None,
            }),
            services: vec![
                Service {
                    port: Some(80),
                    tls: None,
                    scan_time: Some("2025-06-01T00:00:00Z".to_string()),
                },
                Service {
                    port: Some(443),
                    tls: Some(serde_json::json!({})),
                    scan_time: None,
                },
            ],
        };
        let hosts = CensysPlugin::normalize(&body);
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].port, 80);
        assert_eq!(hosts[0].protocol, Protocol::Http);
        assert_eq!(hosts[1].protocol, Protocol::Https);
        assert_eq!(hosts[0].metadata.asn.as_deref(), Some("AS64496"));
        assert_eq!(hosts[0].hostname.as_deref(), Some("a.example"));
    }

    #[test]
    fn test_normalize_webproperty_endpoint() {
        let body = ResourceBody {
            ip: None,
            dns: None,
            endpoints: vec![Endpoint {
                ip: Some("5.6.7.8".to_string()),
                hostname: Some("web.example".to_string()),
                port: Some(8443),
            }],
            location: None,
            autonomous_system: None,
            services: Vec::new(),
        };
        let hosts = CensysPlugin::normalize(&body);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].ip, "5.6.7.8");
        assert_eq!(hosts[0].port, 8443);
        assert_eq!(hosts[0].protocol, Protocol::Https);
    }

    #[test]
    fn test_normalize_without_ip_yields_nothing() {
        let body = ResourceBody::default();
        assert!(CensysPlugin::normalize(&body).is_empty());
    }
}
