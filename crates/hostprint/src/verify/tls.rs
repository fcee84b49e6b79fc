//! TLS certificate harvesting.
//!
//! For attribution we want the certificate itself, not an opinion about
//! it: the handshake runs with chain and hostname verification disabled,
//! and expired or self-signed certificates are parsed all the same. Every
//! failure mode lands in [`TlsInfo::error`]; nothing here returns an
//! error to the caller.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::util::truncate_chars;

/// Parsed certificate data for one host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsInfo {
    /// Subject common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// Subject organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_org: Option<String>,
    /// Issuer common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Issuer organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_org: Option<String>,
    /// Not-before bound, ISO-8601 UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    /// Not-after bound, ISO-8601 UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    /// Subject alternative names (DNS and IP)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub san: Vec<String>,
    /// RFC822 email names from the SAN extension
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_addresses: Vec<String>,
    /// Serial number, uppercase hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// SHA-256 fingerprint of the DER bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_sha256: Option<String>,
    /// Whether now falls inside the validity window
    #[serde(default)]
    pub is_valid: bool,
    /// Whether subject equals issuer
    #[serde(default)]
    pub is_self_signed: bool,
    /// Why the harvest failed, when it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TlsInfo {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(truncate_chars(&error.into(), 80)),
            ..Default::default()
        }
    }
}

/// Client that collects certificates from `(host, port)` targets.
#[derive(Debug, Clone)]
pub struct TlsClient {
    timeout: Duration,
}

impl TlsClient {
    /// Create a client with the given handshake timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Fetch and parse the peer certificate of one host.
    pub async fn fetch_cert(&self, host: &str, port: u16) -> TlsInfo {
        let connector = match native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
        {
            Ok(connector) => tokio_native_tls::TlsConnector::from(connector),
            Err(e) => return TlsInfo::failed(format!("TLS setup error: {e}")),
        };

        let tcp = match timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return TlsInfo::failed(format!("connect error: {e}")),
            Err(_) => return TlsInfo::failed("connection timeout"),
        };

        let tls = match timeout(self.timeout, connector.connect(host, tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return TlsInfo::failed(format!("TLS error: {e}")),
            Err(_) => return TlsInfo::failed("handshake timeout"),
        };

        let der = match tls.get_ref().peer_certificate() {
            Ok(Some(cert)) => match cert.to_der() {
                Ok(der) => der,
                Err(e) => return TlsInfo::failed(format!("DER export error: {e}")),
            },
            Ok(None) => return TlsInfo::failed("no certificate returned"),
            Err(e) => return TlsInfo::failed(format!("peer certificate error: {e}")),
        };

        parse_der_certificate(&der)
    }

    /// Fetch certificates for many targets with bounded fan-out.
    /// Duplicate targets are collapsed before fetching.
    pub async fn bulk_fetch(
        &self,
        targets: &[(String, u16)],
        workers: usize,
    ) -> HashMap<(String, u16), TlsInfo> {
        let mut unique: Vec<(String, u16)> = targets.to_vec();
        unique.sort();
        unique.dedup();
        debug!(targets = unique.len(), "fetching TLS certificates");

        stream::iter(unique)
            .map(|(host, port)| async move {
                let info = self.fetch_cert(&host, port).await;
                ((host, port), info)
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await
    }
}

/// Parse a DER certificate into [`TlsInfo`]. Parse failures populate
/// `error` instead of propagating.
pub(crate) fn parse_der_certificate(der: &[u8]) -> TlsInfo {
    let cert = match X509Certificate::from_der(der) {
        Ok((_, cert)) => cert,
        Err(e) => return TlsInfo::failed(format!("parse error: {e}")),
    };

    let subject = cert.subject();
    let issuer = cert.issuer();
    let common_name = first_attr(subject.iter_common_name());
    let subject_org = first_attr(subject.iter_organization());
    let issuer_cn = first_attr(issuer.iter_common_name());
    let issuer_org = first_attr(issuer.iter_organization());

    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();
    let now = Utc::now().timestamp();
    let is_valid = now >= not_before && now <= not_after;
    let is_self_signed = subject.as_raw() == issuer.as_raw();

    let mut san = Vec::new();
    let mut emails = Vec::new();
    if let Ok(Some(extension)) = cert.subject_alternative_name() {
        for name in &extension.value.general_names {
            match name {
                GeneralName::DNSName(dns) => san.push((*dns).to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = format_ip_bytes(bytes) {
                        san.push(ip);
                    }
                }
                GeneralName::RFC822Name(email) => emails.push((*email).to_string()),
                _ => {}
            }
        }
    }

    TlsInfo {
        common_name,
        subject_org,
        issuer: issuer_cn,
        issuer_org,
        valid_from: iso_from_timestamp(not_before),
        valid_to: iso_from_timestamp(not_after),
        san,
        email_addresses: emails,
        serial_number: Some(hex::encode_upper(cert.raw_serial())),
        fingerprint_sha256: Some(hex::encode(Sha256::digest(der))),
        is_valid,
        is_self_signed,
        error: None,
    }
}

fn first_attr<'a>(
    mut attrs: impl Iterator<Item = &'a x509_parser::x509::AttributeTypeAndValue<'a>>,
) -> Option<String> {
    attrs
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(ToString::to_string)
}

fn iso_from_timestamp(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

fn format_ip_bytes(bytes: &[u8]) -> Option<String> {
    match bytes.len() {
        4 => Some(std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string()),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}
