//! Integration tests for the IPInfo client: lookups, caching, and
//! failure downgrades.

#![allow(clippy::unwrap_used)]

use hostprint::enrich::IpLookup;
use hostprint_ipinfo::IpInfoClient;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_lookup_parses_and_detects_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1.2.3.4/json"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "1.2.3.4",
            "hostname": "static.1.2.3.4.clients.example",
            "city": "Falkenstein",
            "region": "Saxony",
            "country": "DE",
            "org": "AS24940 Hetzner Online GmbH",
            "loc": "50.4779,12.3713",
            "timezone": "Europe/Berlin"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = IpInfoClient::new(Some("test-token".to_string()), dir.path())
        .unwrap()
        .with_base_url(server.uri());

    let record = client.lookup("1.2.3.4").await;
    assert_eq!(record.asn.as_deref(), Some("AS24940"));
    assert_eq!(record.company.as_deref(), Some("Hetzner Online GmbH"));
    assert_eq!(record.hosting_provider.as_deref(), Some("Hetzner"));
    assert!(record.is_hosting);
    assert_eq!(record.country.as_deref(), Some("DE"));
}

#[tokio::test]
async fn test_second_lookup_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/5.6.7.8/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "5.6.7.8",
            "country": "FR",
            "org": "AS64496 Example"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = IpInfoClient::new(Some("t".to_string()), dir.path())
        .unwrap()
        .with_base_url(server.uri());

    let first = client.lookup("5.6.7.8").await;
    let second = client.lookup("5.6.7.8").await;
    assert_eq!(first, second);
    // The cache file exists on disk, keyed by the underscored IP
    assert!(dir.path().join("5_6_7_8.json").exists());
}

#[tokio::test]
async fn test_rate_limit_downgrades_to_sentinel_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = IpInfoClient::new(Some("t".to_string()), dir.path())
        .unwrap()
        .with_base_url(server.uri());

    let record = client.lookup("9.9.9.9").await;
    assert_eq!(record.ip, "9.9.9.9");
    assert_eq!(record.company.as_deref(), Some("Rate Limited"));
    assert!(!record.is_hosting);
}

#[tokio::test]
async fn test_transport_error_downgrades_to_sentinel_record() {
    let dir = tempfile::tempdir().unwrap();
    let client = IpInfoClient::new(Some("t".to_string()), dir.path())
        .unwrap()
        .with_base_url("http://127.0.0.1:1");

    let record = client.lookup("9.9.9.9").await;
    assert_eq!(record.ip, "9.9.9.9");
    assert!(record.company.as_deref().unwrap().starts_with("Error:"));
}

#[tokio::test]
async fn test_bulk_lookup_deduplicates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1.1.1.1/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"country": "AU"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = IpInfoClient::new(Some("t".to_string()), dir.path())
        .unwrap()
        .with_base_url(server.uri());

    let results = client
        .bulk_lookup(&["1.1.1.1".to_string(), "1.1.1.1".to_string()])
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results.get("1.1.1.1").unwrap().country.as_deref(), Some("AU"));
}
