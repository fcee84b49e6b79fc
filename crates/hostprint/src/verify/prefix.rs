//! App-prefix derivation for the last-chance path retry.
//!
//! Many applications live under a context path (`/dvwa/`, `/jenkins/`)
//! rather than the web root. When root probing scores low, the engine
//! retries under a short prefix derived from the application name.

/// Names whose conventional deployment path is not derivable from the
/// name itself.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("damn vulnerable web application", "dvwa"),
    ("owasp juice shop", "juice-shop"),
];

/// Leading words that never appear in a deployment path.
const STRIP_PREFIXES: &[&str] = &["owasp ", "apache ", "the "];

const MAX_PREFIX_LENGTH: usize = 20;

/// Collapse non-alphanumeric runs to single dashes and trim.
fn dashify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_dash = true;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Derive a URL path segment from an application name.
///
/// `"Damn Vulnerable Web Application"` → `dvwa`,
/// `"OWASP Juice Shop"` → `juice-shop`, `"Jenkins"` → `jenkins`.
/// Returns `None` for an empty name.
#[must_use]
pub fn derive_app_prefix(app_name: &str) -> Option<String> {
    let trimmed = app_name.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut lowered = trimmed.to_lowercase();
    for (name, abbreviation) in ABBREVIATIONS {
        if lowered == *name {
            return Some((*abbreviation).to_string());
        }
    }

    for strip in STRIP_PREFIXES {
        if let Some(rest) = lowered.strip_prefix(strip) {
            lowered = rest.to_string();
        }
    }

    let mut prefix = dashify(&lowered);

    if prefix.len() > MAX_PREFIX_LENGTH {
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        if words.len() > 1 {
            let acronym: String = words
                .iter()
                .filter_map(|w| w.chars().next())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if acronym.len() >= 2 {
                prefix = acronym;
            }
        } else {
            prefix.truncate(MAX_PREFIX_LENGTH);
        }
    }

    if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    }
}
