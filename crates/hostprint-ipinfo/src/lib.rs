//! # IPInfo Enrichment Client
//!
//! Implements HostPrint's [`IpLookup`] interface against the IPInfo API,
//! with hosting-provider detection and a per-IP disk cache. IPInfo data
//! is stable, so cached records default to a 30-day TTL.
//!
//! ## Configuration
//!
//! Set `IPINFO_TOKEN`. Without a token the client still works against the
//! free tier, which is heavily rate limited.
//!
//! Lookups never fail the pipeline: rate limits and transport errors come
//! back as records with only `ip` (and a diagnostic `company`) populated.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostprint::enrich::{IpInfoRecord, IpLookup};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://ipinfo.io";
const DEFAULT_CACHE_TTL_DAYS: u32 = 30;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloud/hosting provider detection table: canonical provider name to
/// the org-name substrings and ASNs that identify it.
const PROVIDER_PATTERNS: &[(&str, &[&str])] = &[
    ("AWS", &["amazon", "aws", "as16509", "as14618"]),
    ("GCP", &["google cloud", "google llc", "as15169", "as396982"]),
    ("Azure", &["microsoft", "azure", "as8075"]),
    ("DigitalOcean", &["digitalocean", "as14061"]),
    ("Linode", &["linode", "akamai connected cloud", "as63949"]),
    ("Vultr", &["vultr", "as20473", "the constant company"]),
    ("OVH", &["ovh", "as16276"]),
    ("Hetzner", &["hetzner", "as24940"]),
    ("Cloudflare", &["cloudflare", "as13335"]),
    ("Alibaba", &["alibaba", "aliyun", "as45102", "as37963"]),
    ("Oracle Cloud", &["oracle", "as31898"]),
    ("IBM Cloud", &["ibm", "softlayer", "as36351"]),
    ("Tencent", &["tencent", "as45090", "as132203"]),
    ("Scaleway", &["scaleway", "online s.a.s", "as12876"]),
    ("Contabo", &["contabo", "as51167"]),
    ("Hostinger", &["hostinger", "as47583"]),
];

/// ASNs known to belong to hosting providers even when the org string
/// does not give the provider away.
const HOSTING_ASNS: &[&str] = &[
    "AS16509", "AS14618", "AS15169", "AS396982", "AS8075", "AS14061", "AS63949", "AS20473",
    "AS16276", "AS24940", "AS13335", "AS45102", "AS37963", "AS31898", "AS36351", "AS45090",
    "AS132203", "AS12876",
];

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    loc: Option<String>,
    #[serde(default)]
    postal: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    ip: String,
    result: IpInfoRecord,
    cached_at: String,
}

/// IPInfo API client with disk caching.
pub struct IpInfoClient {
    token: Option<String>,
    base_url: String,
    cache_dir: PathBuf,
    cache_ttl_days: u32,
    client: reqwest::Client,
}

impl IpInfoClient {
    /// Create a client. `token` of `None` uses the free tier.
    pub fn new(token: Option<String>, cache_dir: impl Into<PathBuf>) -> hostprint::Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            token: token.filter(|t| !t.is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir,
            cache_ttl_days: DEFAULT_CACHE_TTL_DAYS,
            client,
        })
    }

    /// Create a client from the `IPINFO_TOKEN` environment variable.
    pub fn from_env(cache_dir: impl Into<PathBuf>) -> hostprint::Result<Self> {
        Self::new(std::env::var("IPINFO_TOKEN").ok(), cache_dir)
    }

    /// Whether an API token is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Point the client at a different API endpoint (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the cache TTL; 0 disables expiry.
    #[must_use]
    pub fn with_cache_ttl_days(mut self, days: u32) -> Self {
        self.cache_ttl_days = days;
        self
    }

    fn cache_path(&self, ip: &str) -> PathBuf {
        let safe = ip.replace(['.', ':'], "_");
        self.cache_dir.join(format!("{safe}.json"))
    }

    fn load_cache(&self, ip: &str) -> Option<IpInfoRecord> {
        let raw = std::fs::read_to_string(self.cache_path(ip)).ok()?;
        let entry: CacheEntry = serde_json::from_str(&raw).ok()?;
        if self.cache_ttl_days > 0 {
            let cached = DateTime::parse_from_rfc3339(&entry.cached_at).ok()?;
            let age = Utc::now() - cached.with_timezone(&Utc);
            if age > chrono::Duration::days(i64::from(self.cache_ttl_days)) {
                return None;
            }
        }
        Some(entry.result)
    }

    fn save_cache(&self, ip: &str, result: &IpInfoRecord) {
        let entry = CacheEntry {
            ip: ip.to_string(),
            result: result.clone(),
            cached_at: hostprint::util::utc_now_iso(),
        };
        match serde_json::to_string_pretty(&entry) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(self.cache_path(ip), serialized) {
                    debug!(ip, error = %e, "ipinfo cache write failed");
                }
            }
            Err(e) => debug!(ip, error = %e, "ipinfo cache serialization failed"),
        }
    }

    async fn fetch(&self, ip: &str) -> IpInfoRecord {
        let url = format!("{}/{ip}/json", self.base_url);
        debug!(%url, "ipinfo lookup");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return IpInfoRecord {
                    ip: ip.to_string(),
                    company: Some(format!("Error: {e}").chars().take(60).collect()),
                    ..Default::default()
                }
            }
        };
        if response.status().as_u16() == 429 {
            return IpInfoRecord {
                ip: ip.to_string(),
                company: Some("Rate Limited".to_string()),
                ..Default::default()
            };
        }
        let parsed: ApiResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                return IpInfoRecord {
                    ip: ip.to_string(),
                    company: Some(format!("Error: {e}").chars().take(60).collect()),
                    ..Default::default()
                }
            }
        };

        let asn = parse_asn(parsed.org.as_deref());
        let (is_hosting, provider) = detect_provider(parsed.org.as_deref(), asn.as_deref());
        let record = IpInfoRecord {
            ip: ip.to_string(),
            hostname: parsed.hostname,
            city: parsed.city,
            region: parsed.region,
            country: parsed.country,
            country_name: None,
            company: company_from_org(parsed.org.as_deref()),
            org: parsed.org,
            asn,
            is_hosting,
            hosting_provider: provider.map(ToString::to_string),
            loc: parsed.loc,
            postal: parsed.postal,
            timezone: parsed.timezone,
        };
        self.save_cache(ip, &record);
        record
    }

    /// Look up many IPs, deduplicated, returning a map keyed by IP.
    /// Cached records are answered without touching the API.
    pub async fn bulk_lookup(&self, ips: &[String]) -> HashMap<String, IpInfoRecord> {
        let mut unique: Vec<String> = ips.to_vec();
        unique.sort();
        unique.dedup();

        let mut results = HashMap::with_capacity(unique.len());
        for ip in unique {
            let record = self.lookup(&ip).await;
            results.insert(ip, record);
        }
        results
    }
}

#[async_trait]
impl IpLookup for IpInfoClient {
    async fn lookup(&self, ip: &str) -> IpInfoRecord {
        if let Some(cached) = self.load_cache(ip) {
            return cached;
        }
        self.fetch(ip).await
    }
}

/// Extract the ASN from an org string like `AS16509 Amazon.com, Inc.`.
fn parse_asn(org: Option<&str>) -> Option<String> {
    let first = org?.split_whitespace().next()?;
    let upper = first.to_uppercase();
    if upper.starts_with("AS") && upper.len() > 2 {
        Some(upper)
    } else {
        None
    }
}

/// Company name without the leading ASN token.
fn company_from_org(org: Option<&str>) -> Option<String> {
    let org = org?;
    match org.split_once(char::is_whitespace) {
        Some((first, rest)) if first.to_uppercase().starts_with("AS") => Some(rest.to_string()),
        _ => Some(org.to_string()),
    }
}

/// Whether the org/ASN pair belongs to a hosting provider, and which one.
fn detect_provider(org: Option<&str>, asn: Option<&str>) -> (bool, Option<&'static str>) {
    if org.is_none() && asn.is_none() {
        return (false, None);
    }
    let org_lower = org.unwrap_or("").to_lowercase();
    let asn_upper = asn.unwrap_or("").to_uppercase();

    for (provider, patterns) in PROVIDER_PATTERNS {
        for pattern in *patterns {
            if org_lower.contains(pattern) || pattern.to_uppercase() == asn_upper {
                return (true, Some(provider));
            }
        }
    }
    if HOSTING_ASNS.contains(&asn_upper.as_str()) {
        // Known hosting space, unidentified brand
        return (true, None);
    }
    (false, None)
}
