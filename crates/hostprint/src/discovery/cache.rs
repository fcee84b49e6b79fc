//! Per-query result cache: one JSON file per `(plugin, query)` pair.
//!
//! The cache key is derived from the *normalized* query, not the
//! plugin-native translation, so a change to a plugin's `translate_query`
//! does not invalidate existing entries. TTL is evaluated at read time
//! only; writes are idempotent, so concurrent writers of the same key are
//! harmless.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::candidate::CandidateHost;
use crate::error::Result;
use crate::util::utc_now_iso;

/// Cached result of a single discovery query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCache {
    /// First 16 hex chars of SHA-256 over `"<plugin>:<query_type>:<value>"`
    pub query_hash: String,
    /// Plugin that answered the query
    pub platform: String,
    /// Signal label for the log line, e.g. `favicon` or `title`
    pub query_type: String,
    /// The canonical `<query_type>:<value>` string
    pub query_string: String,
    /// When the query executed, ISO-8601 UTC
    pub query_timestamp: String,
    /// Number of candidates stored
    pub result_count: usize,
    /// The candidates themselves
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateHost>,
}

impl QueryCache {
    /// Cache key for a platform + canonical query string.
    #[must_use]
    pub fn hash_query(platform: &str, query_string: &str) -> String {
        let digest = Sha256::digest(format!("{platform}:{query_string}").as_bytes());
        hex::encode(digest)[..16].to_string()
    }
}

/// Aggregate cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of cached queries
    pub total_queries: usize,
    /// Total candidates across all entries
    pub total_candidates: usize,
    /// Entries within TTL
    pub valid_queries: usize,
    /// Entries past TTL
    pub expired_queries: usize,
    /// Entries per platform
    pub by_platform: std::collections::BTreeMap<String, usize>,
    /// Timestamp of the oldest entry
    pub oldest: Option<String>,
    /// Timestamp of the newest entry
    pub newest: Option<String>,
}

/// Disk-backed store of [`QueryCache`] entries.
#[derive(Debug, Clone)]
pub struct QueryCacheStore {
    dir: PathBuf,
    ttl_days: u32,
}

impl QueryCacheStore {
    /// Open (and create) a cache directory. `ttl_days` of 0 disables expiry.
    pub fn new(dir: impl Into<PathBuf>, ttl_days: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl_days })
    }

    /// Path of the cache file for a query hash
    #[must_use]
    pub fn path_for(&self, query_hash: &str) -> PathBuf {
        self.dir.join(format!("query_{query_hash}.json"))
    }

    /// Whether a cache file exists for the hash, regardless of TTL
    #[must_use]
    pub fn exists(&self, query_hash: &str) -> bool {
        self.path_for(query_hash).exists()
    }

    /// Load a non-expired entry. Any failure (missing file, bad JSON,
    /// unparseable timestamp) degrades to a miss.
    #[must_use]
    pub fn load(&self, query_hash: &str) -> Option<QueryCache> {
        let path = self.path_for(query_hash);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "cache read failed, treating as miss");
                }
                return None;
            }
        };
        let entry: QueryCache = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cache entry unparseable, treating as miss");
                return None;
            }
        };
        if self.is_expired(&entry.query_timestamp) {
            return None;
        }
        Some(entry)
    }

    /// Persist an entry. The write is idempotent; callers treat failures
    /// as a lost cache, not a lost query.
    pub fn save(
        &self,
        platform: &str,
        query_type: &str,
        query_string: &str,
        candidates: &[CandidateHost],
    ) -> Result<QueryCache> {
        let entry = QueryCache {
            query_hash: QueryCache::hash_query(platform, query_string),
            platform: platform.to_string(),
            query_type: query_type.to_string(),
            query_string: query_string.to_string(),
            query_timestamp: utc_now_iso(),
            result_count: candidates.len(),
            candidates: candidates.to_vec(),
        };
        let file = fs::File::create(self.path_for(&entry.query_hash))?;
        serde_json::to_writer_pretty(file, &entry)?;
        Ok(entry)
    }

    /// Age of a cached entry in whole days, when its timestamp parses.
    #[must_use]
    pub fn age_days(&self, entry: &QueryCache) -> Option<i64> {
        let cached = DateTime::parse_from_rfc3339(&entry.query_timestamp).ok()?;
        Some((Utc::now() - cached.with_timezone(&Utc)).num_days())
    }

    fn is_expired(&self, timestamp: &str) -> bool {
        if self.ttl_days == 0 {
            return false;
        }
        let Ok(cached) = DateTime::parse_from_rfc3339(timestamp) else {
            return true;
        };
        Utc::now() - cached.with_timezone(&Utc) > Duration::days(i64::from(self.ttl_days))
    }

    /// Delete cached queries. With `expired_only`, keeps entries inside
    /// the TTL. Returns `(cleared, kept)`.
    #[must_use]
    pub fn clear(&self, expired_only: bool) -> (usize, usize) {
        let mut cleared = 0;
        let mut kept = 0;
        for path in self.entry_paths() {
            if expired_only {
                let valid = fs::read_to_string(&path)
                    .ok()
                    .and_then(|raw| serde_json::from_str::<QueryCache>(&raw).ok())
                    .is_some_and(|entry| !self.is_expired(&entry.query_timestamp));
                if valid {
                    kept += 1;
                    continue;
                }
            }
            if fs::remove_file(&path).is_ok() {
                cleared += 1;
            }
        }
        (cleared, kept)
    }

    /// Summarize the cache contents
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for path in self.entry_paths() {
            let Some(entry) = fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<QueryCache>(&raw).ok())
            else {
                continue;
            };
            stats.total_queries += 1;
            stats.total_candidates += entry.result_count;
            *stats.by_platform.entry(entry.platform.clone()).or_default() += 1;
            if self.is_expired(&entry.query_timestamp) {
                stats.expired_queries += 1;
            } else {
                stats.valid_queries += 1;
            }
            let ts = entry.query_timestamp;
            if stats.oldest.as_ref().map_or(true, |oldest| ts < *oldest) {
                stats.oldest = Some(ts.clone());
            }
            if stats.newest.as_ref().map_or(true, |newest| ts > *newest) {
                stats.newest = Some(ts);
            }
        }
        stats
    }

    fn entry_paths(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("query_") && n.ends_with(".json"))
            })
            .collect();
        paths.sort();
        paths
    }
}
