//! End-to-end verification scenarios against a local mock origin.

#![allow(clippy::unwrap_used)]

use hostprint::config::{ScoringConfig, VerificationConfig};
use hostprint::discovery::CandidateHost;
use hostprint::fingerprint::{
    CheckType, ExpectedHash, FingerprintFile, FingerprintMode, FingerprintSpec, HashType,
    ProbePlan, ProbeStep, SourceType,
};
use hostprint::hashes;
use hostprint::verify::{Classification, Scheme, VerificationEngine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAVICON_BYTES: &[u8] = b"\x00\x00\x01\x00fake-icon-bytes-for-tests";
const LOGO_BYTES: &[u8] = b"\x89PNGfake-logo-bytes";

fn candidate(ip: &str, port: u16) -> CandidateHost {
    CandidateHost {
        ip: ip.to_string(),
        port,
        hostname: None,
        sources: vec!["shodan".to_string()],
        last_seen: None,
        location: None,
        asn: None,
        organization: None,
        hosting_provider: None,
        is_cloud_hosted: false,
        enriched_at: None,
    }
}

fn favicon_step(order: u32, weight: u32) -> ProbeStep {
    ProbeStep {
        order,
        url_path: "/favicon.ico".to_string(),
        description: "favicon hash".to_string(),
        check_type: CheckType::FaviconHash,
        expected_hash: Some(ExpectedHash {
            hash_type: HashType::Mmh3,
            value: hashes::favicon_mmh3(FAVICON_BYTES),
            alt_values: Vec::new(),
        }),
        expected_title_pattern: None,
        expected_body_patterns: None,
        expected_status: None,
        weight,
    }
}

fn fingerprint(app_name: &str, steps: Vec<ProbeStep>) -> FingerprintFile {
    let mut spec = FingerprintSpec::new(app_name, SourceType::LiveSite, "http://origin");
    spec.mode = FingerprintMode::Application;
    spec.run_id = Some("20250801_120000_abc123".to_string());
    FingerprintFile {
        fingerprint_spec: spec,
        probe_plan: ProbePlan {
            probe_steps: steps,
            ..Default::default()
        },
    }
}

fn engine() -> VerificationEngine {
    let config = VerificationConfig::new()
        .with_workers(4)
        .with_timeout_secs(5)
        .with_fetch_tls(false);
    VerificationEngine::new(config, ScoringConfig::default())
}

async fn mount_favicon(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAVICON_BYTES))
        .mount(server)
        .await;
}

// A matching favicon alone crosses the verified threshold.
#[tokio::test]
async fn favicon_only_candidate_is_verified() {
    let server = MockServer::start().await;
    mount_favicon(&server).await;
    let port = server.address().port();

    let fingerprint = fingerprint("Example App", vec![favicon_step(1, 80)]);
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert_eq!(result.score, 80.0);
    assert_eq!(result.classification, Classification::Verified);
    assert_eq!(result.matched_probes, 1);
    assert_eq!(result.scheme, Scheme::Http);
    assert_eq!(report.verified_count, 1);
}

// A low score under the port-derived scheme triggers the alternate
// scheme, and the better round wins. Port 8443 drives the https-first
// guess; the origin only speaks plain HTTP.
#[tokio::test]
async fn alternate_scheme_rescues_low_score() {
    let Ok(listener) = std::net::TcpListener::bind("127.0.0.1:8443") else {
        // 8443 is the only port that forces an https-first guess; without
        // it this scenario cannot be staged.
        return;
    };
    let server = wiremock::MockServer::builder().listener(listener).start().await;
    mount_favicon(&server).await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Example App Login</title></head></html>"),
        )
        .mount(&server)
        .await;

    let title_step = ProbeStep {
        order: 2,
        url_path: "/login".to_string(),
        description: "login page title".to_string(),
        check_type: CheckType::PageSignature,
        expected_hash: None,
        expected_title_pattern: Some("Example App".to_string()),
        expected_body_patterns: None,
        expected_status: None,
        weight: 1,
    };
    let fingerprint = fingerprint("Example App", vec![favicon_step(1, 80), title_step]);
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", 8443)])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.scheme, Scheme::Http);
    assert!(result.alternate_scheme_tried);
    assert_eq!(result.score, 95.0);
    assert_eq!(result.classification, Classification::Verified);
}

// An application living under its context path is found by the
// prefix retry.
#[tokio::test]
async fn app_prefix_retry_finds_context_path_deployment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dvwa/favicon.ico"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAVICON_BYTES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let port = server.address().port();

    let fingerprint = fingerprint(
        "Damn Vulnerable Web Application",
        vec![favicon_step(1, 80)],
    );
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.prefix_used.as_deref(), Some("/dvwa"));
    assert_eq!(result.score, 80.0);
    assert_eq!(result.classification, Classification::Verified);
    assert_eq!(result.probe_results[0].url_path, "/dvwa/favicon.ico");
}

// Partial page credit, title plus one of two body patterns.
#[tokio::test]
async fn page_signature_awards_partial_credit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>App Portal</title></head><body>Welcome to App</body></html>",
        ))
        .mount(&server)
        .await;
    let port = server.address().port();

    let page_step = ProbeStep {
        order: 1,
        url_path: "/".to_string(),
        description: "landing page".to_string(),
        check_type: CheckType::PageSignature,
        expected_hash: None,
        expected_title_pattern: Some("App|Foo".to_string()),
        expected_body_patterns: Some(vec!["App".to_string(), "ModuleX".to_string()]),
        expected_status: None,
        weight: 1,
    };
    // Organization mode sidesteps the app-prefix retry so the partial
    // score is the final score.
    let mut fingerprint = fingerprint("App", vec![page_step]);
    fingerprint.fingerprint_spec.mode = FingerprintMode::Organization;

    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    let result = &report.results[0];
    let probe = result
        .probe_results
        .iter()
        .find(|p| !p.skipped)
        .expect("page probe executed");
    assert_eq!(probe.points_earned, 30);
    assert_eq!(probe.max_points, 45);
    assert!(probe.matched);
    assert_eq!(result.score, 30.0);
    assert_eq!(result.classification, Classification::Partial);
}

// The running score caps at max_score and later steps appear
// skipped.
#[tokio::test]
async fn early_termination_skips_remaining_probes() {
    let server = MockServer::start().await;
    mount_favicon(&server).await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(LOGO_BYTES))
        .mount(&server)
        .await;
    let port = server.address().port();

    let image_step = ProbeStep {
        order: 2,
        url_path: "/logo.png".to_string(),
        description: "logo image".to_string(),
        check_type: CheckType::ImageHash,
        expected_hash: Some(ExpectedHash {
            hash_type: HashType::Sha256,
            value: hashes::sha256_hex(LOGO_BYTES),
            alt_values: Vec::new(),
        }),
        expected_title_pattern: None,
        expected_body_patterns: None,
        expected_status: None,
        weight: 50,
    };
    let title_step = ProbeStep {
        order: 3,
        url_path: "/".to_string(),
        description: "landing title".to_string(),
        check_type: CheckType::PageSignature,
        expected_hash: None,
        expected_title_pattern: Some("Example".to_string()),
        expected_body_patterns: None,
        expected_status: None,
        weight: 1,
    };
    let fingerprint = fingerprint(
        "Example App",
        vec![favicon_step(1, 80), image_step, title_step],
    );
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.score, 100.0);
    assert_eq!(result.classification, Classification::Verified);
    let skipped: Vec<_> = result.probe_results.iter().filter(|p| p.skipped).collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].probe_order, 3);
    assert_eq!(skipped[0].points_earned, 0);
    // Executed probes: favicon + image
    assert_eq!(result.total_probes, 2);
    assert_eq!(result.matched_probes, 2);
}

// A dead host never reaches the probe phase.
#[tokio::test]
async fn dead_host_reports_no_match_without_probing() {
    // Bind then drop so the port is closed
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let fingerprint = fingerprint("Example App", vec![favicon_step(1, 80)]);
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.score, 0.0);
    assert_eq!(result.classification, Classification::NoMatch);
    assert_eq!(result.scheme, Scheme::Unknown);
    assert!(result.probe_results.is_empty());
    assert_eq!(report.no_match_count, 1);
}

// Identical network responses produce identical verdicts.
#[tokio::test]
async fn verification_is_deterministic_across_runs() {
    let server = MockServer::start().await;
    mount_favicon(&server).await;
    let port = server.address().port();

    let fingerprint = fingerprint("Example App", vec![favicon_step(1, 80)]);
    let engine = engine();
    let first = engine
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();
    let second = engine
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    let a = &first.results[0];
    let b = &second.results[0];
    assert_eq!(a.score, b.score);
    assert_eq!(a.classification, b.classification);
    assert_eq!(a.scheme, b.scheme);
    assert_eq!(a.prefix_used, b.prefix_used);
    assert_eq!(a.alternate_scheme_tried, b.alternate_scheme_tried);
}

// Favicon fallback: a fingerprinted icon path that 404s is retried at
// /favicon.ico before giving up.
#[tokio::test]
async fn favicon_fallback_rescues_moved_icon() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/fav.ico"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_favicon(&server).await;
    let port = server.address().port();

    let mut step = favicon_step(1, 80);
    step.url_path = "/assets/fav.ico".to_string();
    let fingerprint = fingerprint("Example App", vec![step]);
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.score, 80.0);
    assert_eq!(
        result.probe_results[0].url_path,
        "/assets/fav.ico → /favicon.ico (fallback)"
    );
}

// Organization mode discovers the icon path from the homepage link tag.
#[tokio::test]
async fn organization_mode_discovers_favicon_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><link href="/static/brand.ico" rel="icon"></head></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/brand.ico"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FAVICON_BYTES))
        .mount(&server)
        .await;
    let port = server.address().port();

    let mut fingerprint = fingerprint("Example Org", vec![favicon_step(1, 80)]);
    fingerprint.fingerprint_spec.mode = FingerprintMode::Organization;
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.score, 80.0);
    assert_eq!(result.probe_results[0].url_path, "/static/brand.ico (discovered)");
}

// Transient 5xx responses are retried before the status is accepted.
#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_favicon(&server).await;
    let port = server.address().port();

    let fingerprint = fingerprint("Example App", vec![favicon_step(1, 80)]);
    let report = engine()
        .verify_candidates(&fingerprint, vec![candidate("127.0.0.1", port)])
        .await
        .unwrap();

    assert_eq!(report.results[0].score, 80.0);
}
