//! Timestamp, run-id, and naming helpers shared across phases.

use chrono::{SecondsFormat, Utc};
use rand::Rng;

/// Current UTC time in ISO-8601 with microsecond precision and `Z` suffix.
///
/// Every timestamp the pipeline emits goes through this function so that
/// string comparison of `last_seen` values stays a valid ordering.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generate a unique run identifier: `YYYYMMDD_HHMMSS_xxxxxx`.
///
/// The suffix is six random hex characters, enough to disambiguate runs
/// started within the same second.
pub fn new_run_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("{}_{suffix:06x}", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Lowercase, dash-separated slug of an application name, for file names.
pub fn app_slug(app_name: &str) -> String {
    let mut slug = String::with_capacity(app_name.len());
    let mut last_dash = true;
    for c in app_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

/// Truncate a string to at most `max` characters, on a char boundary.
///
/// Used to keep error strings and display values bounded in result records.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_now_iso_shape() {
        let ts = utc_now_iso();
        assert!(ts.ends_with('Z'));
        // 2025-12-06T12:30:00.123456Z
        assert_eq!(ts.len(), 27);
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_run_id_format() {
        let id = new_run_id();
        // YYYYMMDD_HHMMSS_xxxxxx
        assert_eq!(id.len(), 8 + 1 + 6 + 1 + 6);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_app_slug() {
        assert_eq!(app_slug("Damn Vulnerable Web Application"), "damn-vulnerable-web-application");
        assert_eq!(app_slug("OWASP Juice Shop"), "owasp-juice-shop");
        assert_eq!(app_slug("  weird__name!! "), "weird-name");
        assert_eq!(app_slug(""), "unnamed");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters are not split
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
