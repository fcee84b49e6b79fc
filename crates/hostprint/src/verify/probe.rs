//! Probe execution: one HTTP request, one deterministic check.
//!
//! The executor owns a single pooled `reqwest` client shared by every
//! verification worker. TLS verification is disabled on purpose: this is
//! reconnaissance traffic and self-signed certificates are expected, not
//! exceptional. Responses with retryable 5xx statuses are retried twice
//! with backoff before the status is accepted as the answer.

use std::sync::LazyLock;
use std::time::Instant;

use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::debug;
use url::Url;

use super::result::ProbeResult;
use crate::config::{ScoringConfig, VerificationConfig};
use crate::error::Result;
use crate::fingerprint::{CheckType, ExpectedHash, FingerprintMode, HashType, ProbeStep};
use crate::hashes;
use crate::util::truncate_chars;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];
const HTTP_RETRIES: usize = 2;
const ERROR_DETAIL_LIMIT: usize = 100;

static TITLE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    RegexBuilder::new(r"<title[^>]*>([^<]*)</title>")
        .case_insensitive(true)
        .build()
        .ok()
});

enum FetchError {
    /// Retryable server status; carries the response so the final
    /// attempt's status is still recorded
    Status(Box<reqwest::Response>),
    Transport(reqwest::Error),
}

/// Executes individual probe steps against a target base URL.
pub struct ProbeExecutor {
    client: reqwest::Client,
    mode: FingerprintMode,
    scoring: ScoringConfig,
}

impl ProbeExecutor {
    /// Build an executor from verification and scoring configuration.
    pub fn new(
        config: &VerificationConfig,
        scoring: ScoringConfig,
        mode: FingerprintMode,
    ) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(100)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            mode,
            scoring,
        })
    }

    /// Execute one probe step against a base URL.
    ///
    /// Transport failures become `error` on the result with zero points;
    /// they never propagate.
    pub async fn execute_probe(&self, base_url: &str, probe: &ProbeStep) -> ProbeResult {
        let mut result = ProbeResult::pending(probe.order, probe.check_type, &probe.url_path);
        result.max_points = self.max_points_for(probe);
        let started = Instant::now();

        if probe.check_type == CheckType::FaviconHash && self.mode == FingerprintMode::Organization
        {
            return self.probe_favicon_discovered(base_url, probe, started).await;
        }

        let url = join_url(base_url, &probe.url_path);
        debug!(%url, check = ?probe.check_type, "probing");

        match self.get_with_retry(&url).await {
            Ok(response) => {
                let status = response.status().as_u16();
                result.http_status = Some(status);
                result.success = true;
                let body = match response.bytes().await {
                    Ok(body) => body.to_vec(),
                    Err(e) => {
                        result.success = false;
                        result.error = Some(fetch_error_message(&e));
                        result.response_time_ms = Some(elapsed_ms(started));
                        return result;
                    }
                };
                result.response_time_ms = Some(elapsed_ms(started));

                match probe.check_type {
                    CheckType::FaviconHash => {
                        self.check_favicon_hash(status, &body, probe, &mut result);
                        // Browsers fall back to /favicon.ico when no link
                        // tag names another location; so do we.
                        if !result.matched && probe.url_path != "/favicon.ico" {
                            self.try_favicon_fallback(base_url, probe, &mut result).await;
                        }
                    }
                    CheckType::ImageHash => self.check_image_hash(status, &body, probe, &mut result),
                    CheckType::PageSignature => {
                        self.check_page_signature(status, &body, probe, &mut result);
                    }
                }
            }
            Err(e) => {
                result.error = Some(fetch_error_message(&e));
                result.response_time_ms = Some(elapsed_ms(started));
            }
        }
        result
    }

    /// Points a full match of this step is worth.
    fn step_points(&self, probe: &ProbeStep, fallback: u32) -> u32 {
        if probe.weight > 1 {
            probe.weight
        } else {
            fallback
        }
    }

    fn max_points_for(&self, probe: &ProbeStep) -> u32 {
        match probe.check_type {
            CheckType::FaviconHash => self.step_points(probe, self.scoring.favicon_points),
            CheckType::ImageHash => self.step_points(probe, self.scoring.image_points),
            CheckType::PageSignature => {
                let title = u32::from(probe.expected_title_pattern.is_some())
                    * self.scoring.title_points;
                let body = probe
                    .expected_body_patterns
                    .as_ref()
                    .map_or(0, |patterns| patterns.len() as u32 * self.scoring.body_points);
                title + body
            }
        }
    }

    async fn get_with_retry(&self, url: &str) -> std::result::Result<reqwest::Response, reqwest::Error> {
        // 500 ms then 1 s between attempts
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .take(HTTP_RETRIES);
        let outcome = Retry::spawn(strategy, || async {
            match self.client.get(url).send().await {
                Ok(response) if RETRY_STATUSES.contains(&response.status().as_u16()) => {
                    Err(FetchError::Status(Box::new(response)))
                }
                Ok(response) => Ok(response),
                Err(e) => Err(FetchError::Transport(e)),
            }
        })
        .await;
        match outcome {
            Ok(response) => Ok(response),
            // Retries exhausted on a 5xx: the status is the answer
            Err(FetchError::Status(response)) => Ok(*response),
            Err(FetchError::Transport(e)) => Err(e),
        }
    }

    fn check_favicon_hash(
        &self,
        status: u16,
        body: &[u8],
        probe: &ProbeStep,
        result: &mut ProbeResult,
    ) {
        let points = self.step_points(probe, self.scoring.favicon_points);
        result.max_points = points;
        if status != 200 {
            result.error = Some(format!("HTTP {status}"));
            return;
        }
        let Some(expected) = &probe.expected_hash else {
            result.error = Some("no expected hash in probe".to_string());
            return;
        };

        let actual = match expected.hash_type {
            HashType::Mmh3 => hashes::favicon_mmh3(body),
            HashType::Sha256 => hashes::sha256_hex(body),
            HashType::Md5 => hashes::md5_hex(body),
            HashType::Phash => {
                result.error = Some("phash is not valid for favicon checks".to_string());
                return;
            }
        };
        result.expected = Some(describe_expected(expected));
        result.actual = Some(format!("{}:{actual}", hash_type_name(expected.hash_type)));
        result.matched = expected.all_values().contains(&actual.as_str());
        if result.matched {
            result.points_earned = points;
        }
    }

    async fn try_favicon_fallback(
        &self,
        base_url: &str,
        probe: &ProbeStep,
        result: &mut ProbeResult,
    ) {
        let fallback_url = join_url(base_url, "/favicon.ico");
        debug!(%fallback_url, "favicon fallback");
        let Ok(response) = self.get_with_retry(&fallback_url).await else {
            return;
        };
        let status = response.status().as_u16();
        if status != 200 {
            return;
        }
        let Ok(body) = response.bytes().await else {
            return;
        };
        let mut fallback =
            ProbeResult::pending(probe.order, probe.check_type, "/favicon.ico");
        fallback.http_status = Some(status);
        fallback.success = true;
        fallback.response_time_ms = result.response_time_ms;
        self.check_favicon_hash(status, &body, probe, &mut fallback);
        if fallback.matched {
            fallback.url_path = format!("{} → /favicon.ico (fallback)", probe.url_path);
            *result = fallback;
        }
    }

    /// Organization-mode favicon probing: discover the icon path from the
    /// homepage's `<link rel>` tags, probe it, then fall back to
    /// `/favicon.ico`. Sites under one brand keep the same icon bytes in
    /// different places.
    async fn probe_favicon_discovered(
        &self,
        base_url: &str,
        probe: &ProbeStep,
        started: Instant,
    ) -> ProbeResult {
        let mut result = ProbeResult::pending(probe.order, probe.check_type, &probe.url_path);
        result.max_points = self.step_points(probe, self.scoring.favicon_points);

        let discovered = self.discover_favicon_path(base_url).await;
        debug!(path = %discovered, "probing discovered favicon path");

        let discovered_url = join_url(base_url, &discovered);
        match self.get_with_retry(&discovered_url).await {
            Ok(response) => {
                let status = response.status().as_u16();
                if let Ok(body) = response.bytes().await {
                    result.http_status = Some(status);
                    result.success = true;
                    result.url_path = discovered.clone();
                    result.response_time_ms = Some(elapsed_ms(started));
                    self.check_favicon_hash(status, &body, probe, &mut result);
                    if result.matched {
                        result.url_path = format!("{discovered} (discovered)");
                        return result;
                    }
                }
            }
            Err(e) => {
                debug!(error = %fetch_error_message(&e), "discovered favicon path failed");
                result.response_time_ms = Some(elapsed_ms(started));
            }
        }

        if discovered != "/favicon.ico" {
            self.try_favicon_fallback(base_url, probe, &mut result).await;
            if result.matched {
                result.url_path = format!("{discovered} → /favicon.ico (fallback)");
            }
        }
        result
    }

    /// Fetch the homepage and extract the first icon link's path.
    /// Falls back to `/favicon.ico` on any miss.
    async fn discover_favicon_path(&self, base_url: &str) -> String {
        let Ok(response) = self.get_with_retry(base_url).await else {
            return "/favicon.ico".to_string();
        };
        if response.status().as_u16() != 200 {
            return "/favicon.ico".to_string();
        }
        let Ok(html) = response.text().await else {
            return "/favicon.ico".to_string();
        };
        extract_icon_href(&html)
            .map(|href| resolve_favicon_path(&href))
            .unwrap_or_else(|| "/favicon.ico".to_string())
    }

    fn check_image_hash(
        &self,
        status: u16,
        body: &[u8],
        probe: &ProbeStep,
        result: &mut ProbeResult,
    ) {
        let points = self.step_points(probe, self.scoring.image_points);
        result.max_points = points;
        if status != 200 {
            result.error = Some(format!("HTTP {status}"));
            return;
        }
        let Some(expected) = &probe.expected_hash else {
            result.error = Some("no expected hash in probe".to_string());
            return;
        };
        result.expected = Some(describe_expected(expected));

        match expected.hash_type {
            HashType::Phash => match hashes::phash_hex(body) {
                Some(actual) => {
                    let mut annotation = format!("phash:{actual}");
                    if actual == expected.value {
                        result.matched = true;
                    } else if let Some(distance) = hashes::phash_distance(&expected.value, &actual)
                    {
                        result.matched = distance <= hashes::PHASH_MATCH_DISTANCE;
                        if result.matched && distance > 0 {
                            annotation.push_str(&format!(" (distance: {distance})"));
                        }
                    }
                    result.actual = Some(annotation);
                }
                None => {
                    result.error = Some("response is not a decodable image".to_string());
                    return;
                }
            },
            HashType::Sha256 => {
                let actual = hashes::sha256_hex(body);
                result.matched = actual == expected.value;
                result.actual = Some(format!("sha256:{actual}"));
            }
            HashType::Md5 => {
                let actual = hashes::md5_hex(body);
                result.matched = actual == expected.value;
                result.actual = Some(format!("md5:{actual}"));
            }
            HashType::Mmh3 => {
                let actual = hashes::image_mmh3(body);
                result.matched = actual == expected.value;
                result.actual = Some(format!("mmh3:{actual}"));
            }
        }
        if result.matched {
            result.points_earned = points;
        }
    }

    /// Page-signature check with partial credit: the title pattern and
    /// each body pattern earn their points independently; `matched` means
    /// any points were earned at all.
    fn check_page_signature(
        &self,
        status: u16,
        body: &[u8],
        probe: &ProbeStep,
        result: &mut ProbeResult,
    ) {
        result.max_points = self.max_points_for(probe);

        if let Some(expected_status) = probe.expected_status {
            if status != expected_status {
                result.expected = Some(format!("HTTP {expected_status}"));
                result.actual = Some(format!("HTTP {status}"));
                return;
            }
        }

        let content = String::from_utf8_lossy(body);
        let mut found = Vec::new();
        let mut wanted = Vec::new();
        let mut points = 0;

        if let Some(pattern) = &probe.expected_title_pattern {
            wanted.push(format!("title:/{pattern}/"));
            if let Some(title) = extract_title(&content) {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) => {
                        if re.is_match(&title) {
                            found.push(format!("title:{}", truncate_chars(&title, 50)));
                            points += self.scoring.title_points;
                        }
                    }
                    Err(e) => {
                        result.error = Some(format!("invalid title pattern: {e}"));
                    }
                }
            }
        }

        if let Some(patterns) = &probe.expected_body_patterns {
            let lowered = content.to_lowercase();
            for pattern in patterns {
                wanted.push(format!("body:/{}/", truncate_chars(pattern, 30)));
                if lowered.contains(&pattern.to_lowercase()) {
                    found.push(format!("body:/{}/", truncate_chars(pattern, 30)));
                    points += self.scoring.body_points;
                }
            }
        }

        result.expected = if wanted.is_empty() {
            Some("HTTP 200".to_string())
        } else {
            Some(wanted.join(" AND "))
        };
        result.actual = if found.is_empty() {
            Some("no patterns matched".to_string())
        } else {
            Some(found.join(" AND "))
        };
        result.points_earned = points;
        result.matched = points > 0;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

fn hash_type_name(hash_type: HashType) -> &'static str {
    match hash_type {
        HashType::Mmh3 => "mmh3",
        HashType::Sha256 => "sha256",
        HashType::Md5 => "md5",
        HashType::Phash => "phash",
    }
}

fn describe_expected(expected: &ExpectedHash) -> String {
    let mut description = format!("{}:{}", hash_type_name(expected.hash_type), expected.value);
    if !expected.alt_values.is_empty() {
        description.push_str(&format!(" (+{} alt)", expected.alt_values.len()));
    }
    description
}

fn fetch_error_message(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timed out".to_string()
    } else if error.is_connect() {
        truncate_chars(&format!("Connection error: {error}"), ERROR_DETAIL_LIMIT)
    } else {
        truncate_chars(&format!("Probe failed: {error}"), ERROR_DETAIL_LIMIT)
    }
}

/// First `<title>` text of the document, if any.
fn extract_title(content: &str) -> Option<String> {
    let re = TITLE_RE.as_ref()?;
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First `<link rel="icon|shortcut icon|apple-touch-icon">` href in the
/// document. DOM parsing makes attribute order irrelevant.
fn extract_icon_href(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("link[rel][href]").ok()?;
    for element in document.select(&selector) {
        let rel = element.value().attr("rel")?.to_lowercase();
        let is_icon = rel
            .split_whitespace()
            .any(|token| token == "icon" || token == "apple-touch-icon");
        if !is_icon {
            continue;
        }
        if let Some(href) = element.value().attr("href") {
            if !href.is_empty() {
                return Some(href.to_string());
            }
        }
    }
    None
}

/// Reduce an icon href (absolute, protocol-relative, root, or relative)
/// to a path on the probed host.
fn resolve_favicon_path(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        Url::parse(href).map_or_else(|_| "/favicon.ico".to_string(), |u| u.path().to_string())
    } else if let Some(rest) = href.strip_prefix("//") {
        Url::parse(&format!("https://{rest}"))
            .map_or_else(|_| "/favicon.ico".to_string(), |u| u.path().to_string())
    } else if href.starts_with('/') {
        href.to_string()
    } else {
        format!("/{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_trims_trailing_slash() {
        assert_eq!(join_url("http://1.2.3.4:80/", "/favicon.ico"), "http://1.2.3.4:80/favicon.ico");
        assert_eq!(join_url("http://1.2.3.4:80", "/x"), "http://1.2.3.4:80/x");
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><head><TITLE>Hello</TITLE></head></html>").as_deref(),
            Some("Hello")
        );
        assert_eq!(
            extract_title(r#"<title class="x">Spaced out</title>"#).as_deref(),
            Some("Spaced out")
        );
        assert!(extract_title("<h1>no title</h1>").is_none());
    }

    #[test]
    fn test_extract_icon_href_attribute_order_tolerant() {
        let html = r#"<html><head>
            <link href="/assets/fav.png" rel="icon" type="image/png">
        </head></html>"#;
        assert_eq!(extract_icon_href(html).as_deref(), Some("/assets/fav.png"));

        let html = r#"<link rel="shortcut icon" href="fav.ico">"#;
        assert_eq!(extract_icon_href(html).as_deref(), Some("fav.ico"));

        let html = r#"<link rel="apple-touch-icon" href="/apple.png">"#;
        assert_eq!(extract_icon_href(html).as_deref(), Some("/apple.png"));

        assert!(extract_icon_href(r#"<link rel="stylesheet" href="/x.css">"#).is_none());
    }

    #[test]
    fn test_resolve_favicon_path() {
        assert_eq!(resolve_favicon_path("https://cdn.example.com/img/fav.ico"), "/img/fav.ico");
        assert_eq!(resolve_favicon_path("//cdn.example.com/fav.ico"), "/fav.ico");
        assert_eq!(resolve_favicon_path("/fav.ico"), "/fav.ico");
        assert_eq!(resolve_favicon_path("fav.ico"), "/fav.ico");
    }

    #[test]
    fn test_describe_expected() {
        let expected = ExpectedHash {
            hash_type: HashType::Mmh3,
            value: "-12345".to_string(),
            alt_values: vec!["1".to_string(), "2".to_string()],
        };
        assert_eq!(describe_expected(&expected), "mmh3:-12345 (+2 alt)");
    }
}
