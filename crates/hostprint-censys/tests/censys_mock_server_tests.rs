//! Integration tests for the Censys plugin against a local mock server,
//! including the process-wide single-request gate.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use hostprint::discovery::{DiscoveryPlugin, DiscoveryQuery, QueryType};
use hostprint_censys::CensysPlugin;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn host_hit(ip: &str, port: u16) -> serde_json::Value {
    json!({
        "host_v1": {
            "resource": {
                "ip": ip,
                "services": [{"port": port, "scan_time": "2025-06-01T00:00:00Z"}],
                "location": {"country": "Germany", "country_code": "DE"},
                "autonomous_system": {"asn": 64496, "name": "Example"}
            }
        }
    })
}

fn plugin(server: &MockServer) -> CensysPlugin {
    CensysPlugin::new("test-token", Some("org-123".to_string())).with_base_url(server.uri())
}

#[tokio::test]
async fn test_single_page_search_sends_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("X-Organization-ID", "org-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "total_hits": 2,
                "hits": [host_hit("1.1.1.1", 80), host_hit("2.2.2.2", 443)]
            }
        })))
        .mount(&server)
        .await;

    let query = DiscoveryQuery::new(QueryType::TitlePattern, "Example");
    let result = plugin(&server).search(&query, None).await;

    assert!(result.success());
    assert_eq!(result.count(), 2);
    assert_eq!(result.total_available, 2);
    assert_eq!(result.hosts[0].source, "censys");
    assert_eq!(result.hosts[0].location.get("country").unwrap(), "Germany");
}

#[tokio::test]
async fn test_page_token_pagination() {
    let server = MockServer::start().await;
    // First page returns a continuation token
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .and(body_partial_json(json!({"page_token": "next-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"total_hits": 2, "hits": [host_hit("2.2.2.2", 80)]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "total_hits": 2,
                "hits": [host_hit("1.1.1.1", 80)],
                "next_page_token": "next-1"
            }
        })))
        .mount(&server)
        .await;

    let query = DiscoveryQuery::new(QueryType::TitlePattern, "Example");
    let result = plugin(&server).search(&query, None).await;

    assert!(result.success());
    assert_eq!(result.count(), 2);
    assert_eq!(result.hosts[0].ip, "1.1.1.1");
    assert_eq!(result.hosts[1].ip, "2.2.2.2");
}

#[tokio::test]
async fn test_rate_limit_carries_partial_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .and(body_partial_json(json!({"page_token": "next-1"})))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "total_hits": 300,
                "hits": [host_hit("1.1.1.1", 80)],
                "next_page_token": "next-1"
            }
        })))
        .mount(&server)
        .await;

    let query = DiscoveryQuery::new(QueryType::TitlePattern, "Example");
    let result = plugin(&server).search(&query, None).await;

    assert!(!result.success());
    assert!(result.error.as_deref().unwrap().contains("rate limit"));
    assert_eq!(result.count(), 1);
}

#[tokio::test]
async fn test_query_error_surfaces_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"detail": "unknown field zz"})),
        )
        .mount(&server)
        .await;

    let query = DiscoveryQuery::new(QueryType::Custom, "zz: 1");
    let result = plugin(&server).search(&query, None).await;
    assert!(!result.success());
    assert!(result.error.as_deref().unwrap().contains("unknown field zz"));
}

// Concurrent searches never overlap; request starts are spaced by at
// least the minimum interval.
#[tokio::test]
async fn test_single_concurrent_request_gate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"total_hits": 0, "hits": []}
        })))
        .mount(&server)
        .await;

    let plugin = Arc::new(plugin(&server));
    let started = Instant::now();
    let mut handles = Vec::new();
    for i in 0..3 {
        let plugin = Arc::clone(&plugin);
        handles.push(tokio::spawn(async move {
            let query = DiscoveryQuery::new(QueryType::TitlePattern, format!("q{i}"));
            plugin.search(&query, None).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success());
    }

    // Three gated requests: at least two full spacing intervals
    assert!(
        started.elapsed() >= Duration::from_secs(2),
        "requests were not spaced by the gate"
    );
}
