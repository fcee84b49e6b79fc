//! Query planner: translate a fingerprint into a ranked, deduplicated,
//! length-capped set of normalized queries.

use std::collections::HashSet;

use tracing::debug;

use super::filters::{is_query_blacklisted, is_version_fragment, GENERIC_TITLE_WORDS};
use super::plugin::{DiscoveryQuery, QueryType};
use crate::fingerprint::FingerprintSpec;

const MIN_TITLE_PART_LENGTH: usize = 3;
const MAX_TITLE_QUERIES: usize = 2;
const MAX_BODY_QUERIES: usize = 2;

/// Convert a fingerprint into at most `max_queries` discovery queries.
///
/// Queries are seeded in signal-priority order (favicon > image > title >
/// body > header), filtered against the blacklist (hash queries exempt),
/// deduplicated by `(type, lowercased value)`, sorted by priority, and
/// truncated.
#[must_use]
pub fn plan_queries(fingerprint: &FingerprintSpec, max_queries: usize) -> Vec<DiscoveryQuery> {
    let mut queries: Vec<DiscoveryQuery> = Vec::new();
    let mut seen: HashSet<(QueryType, String)> = HashSet::new();

    let mut add = |query: DiscoveryQuery, queries: &mut Vec<DiscoveryQuery>| {
        let key = (query.query_type, query.value.to_lowercase());
        if seen.contains(&key) {
            return;
        }
        if !matches!(query.query_type, QueryType::FaviconHash | QueryType::ImageHash)
            && is_query_blacklisted(&query.value)
        {
            debug!(value = %query.value, "dropping blacklisted query value");
            return;
        }
        seen.insert(key);
        queries.push(query);
    };

    // Favicon hashes: one query per MMH3 value, alternates included.
    if let Some(favicon) = &fingerprint.favicon {
        for (i, mmh3) in favicon.hashes.all_mmh3().into_iter().enumerate() {
            let source = if i == 0 {
                "favicon".to_string()
            } else {
                format!("favicon_alt_{i}")
            };
            add(
                DiscoveryQuery::new(QueryType::FaviconHash, mmh3).with_metadata("source", source),
                &mut queries,
            );
        }
    }

    // Key images: carry both hash values so each source's translator can
    // pick the one it indexes (MMH3 vs MD5).
    for (i, image) in fingerprint.key_images.iter().enumerate() {
        if image.hashes.mmh3.is_none() && image.hashes.md5.is_none() {
            continue;
        }
        let mut query = DiscoveryQuery::new(
            QueryType::ImageHash,
            image.hashes.mmh3.clone().unwrap_or_default(),
        )
        .with_metadata("source", format!("image_{i}"))
        .with_metadata("url", image.url_path.clone());
        if let Some(md5) = &image.hashes.md5 {
            query = query.with_metadata("md5", md5.clone());
        }
        if let Some(mmh3) = &image.hashes.mmh3 {
            query = query.with_metadata("mmh3", mmh3.clone());
        }
        add(query, &mut queries);
    }

    // Titles: up to two distinctive phrases drawn from the first two
    // page signatures.
    let mut title_count = 0;
    for signature in fingerprint.page_signatures.iter().take(2) {
        let Some(pattern) = &signature.title_pattern else {
            continue;
        };
        if title_count >= MAX_TITLE_QUERIES {
            break;
        }
        for part in split_title_pattern(pattern).into_iter().take(2) {
            if title_count >= MAX_TITLE_QUERIES {
                break;
            }
            add(
                DiscoveryQuery::new(QueryType::TitlePattern, part)
                    .with_metadata("source", "title")
                    .with_metadata("url", signature.url_path.clone())
                    .with_metadata("original", pattern.clone()),
                &mut queries,
            );
            // A duplicate or blacklisted phrase still spends its slot
            title_count += 1;
        }
    }

    // Body patterns: prefer patterns that name the application; fall back
    // to the first pattern of the first signature when none do.
    let app_name = fingerprint.app_name.to_lowercase();
    let mut body_count = 0;
    for signature in fingerprint.page_signatures.iter().take(2) {
        for pattern in &signature.body_patterns {
            if body_count >= MAX_BODY_QUERIES {
                break;
            }
            if app_name.is_empty() || !pattern.to_lowercase().contains(&app_name) {
                continue;
            }
            add(
                DiscoveryQuery::new(QueryType::BodyPattern, pattern.clone())
                    .with_metadata("source", "body")
                    .with_metadata("url", signature.url_path.clone()),
                &mut queries,
            );
            body_count += 1;
        }
    }
    if body_count == 0 {
        if let Some(signature) = fingerprint.page_signatures.first() {
            if let Some(pattern) = signature.body_patterns.first() {
                add(
                    DiscoveryQuery::new(QueryType::BodyPattern, pattern.clone())
                        .with_metadata("source", "body")
                        .with_metadata("url", signature.url_path.clone()),
                    &mut queries,
                );
            }
        }
    }

    // Highest-value signals first; stable sort keeps seed order within a
    // priority band.
    queries.sort_by_key(|q| std::cmp::Reverse(q.query_type.priority()));
    queries.truncate(max_queries);
    queries
}

/// Split a title pattern on `|` and keep only the distinctive phrases:
/// long enough, not a version/year fragment, not a generic word.
fn split_title_pattern(title_pattern: &str) -> Vec<String> {
    title_pattern
        .split('|')
        .map(str::trim)
        .filter(|part| part.len() >= MIN_TITLE_PART_LENGTH)
        .filter(|part| !is_version_fragment(part))
        .filter(|part| !GENERIC_TITLE_WORDS.contains(&part.to_lowercase().as_str()))
        .map(ToString::to_string)
        .collect()
}
