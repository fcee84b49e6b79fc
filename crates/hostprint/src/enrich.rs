//! IP enrichment interface.
//!
//! The discovery engine enriches candidates with geolocation, network
//! ownership, and hosting-provider data through this trait. The concrete
//! client (IPInfo) lives in its own crate; tests supply fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Enrichment record for one IP address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpInfoRecord {
    /// The address this record describes
    pub ip: String,
    /// Reverse-DNS hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// City name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Region/province name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Country code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Country display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    /// Raw `org` field: ASN plus organization name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// ASN alone, `AS` prefixed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    /// Organization name without the ASN prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Whether the address belongs to a hosting/cloud provider
    #[serde(default)]
    pub is_hosting: bool,
    /// Canonical provider name when identified (AWS, GCP, Hetzner, …)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosting_provider: Option<String>,
    /// `lat,lon` pair as reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,
    /// Postal code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal: Option<String>,
    /// IANA timezone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// An IP intelligence source.
///
/// Lookups are expected to be cheap to repeat (implementations cache) and
/// must not fail the run: a lookup that cannot be answered returns a
/// record with only `ip` populated.
#[async_trait]
pub trait IpLookup: Send + Sync {
    /// Look up one IP address
    async fn lookup(&self, ip: &str) -> IpInfoRecord;
}
