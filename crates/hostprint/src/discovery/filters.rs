//! Query filtering: generic patterns and blacklisted terms.
//!
//! A search for `jquery` or `/wp-content/` would match millions of hosts
//! and burn API credit for nothing, so every non-hash query value passes
//! through these tables before the planner emits it. Hash queries are
//! exempt; a hash is distinctive by construction.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Patterns that mark a value as generic page structure, framework
/// boilerplate, or a common path. Matched case-insensitively, anchored
/// at the start of the value.
const GENERIC_PATTERNS: &[&str] = &[
    // HTML structure
    r"<html\s+lang=",
    r"<meta\s+http-equiv=",
    r"<meta\s+charset=",
    r#"<meta\s+name="viewport""#,
    r#"<meta\s+name="robots""#,
    r"<!DOCTYPE\s+html>",
    r"<div\s+class=",
    r"<span\s+class=",
    // Common headers/meta
    r"X-UA-Compatible",
    r"Content-Type",
    r"charset=UTF-8",
    // Generic JavaScript
    r"dataLayer\s*=",
    r"window\.",
    r"document\.",
    // Frontend frameworks and libraries
    r"jquery$",
    r"bootstrap$",
    r"font-?awesome$",
    r"react$",
    r"angular$",
    r"vue$",
    r"tailwind",
    r"materialize",
    r"foundation$",
    r"bulma$",
    r"semantic-ui",
    r"normalize",
    r"reset\.css",
    r"ng-app$",
    r"ng-controller$",
    r"ng-model$",
    r"ng-view$",
    r"ng-repeat$",
    r"v-app$",
    r"v-model$",
    r"v-if$",
    r"v-for$",
    r"data-reactroot$",
    r"data-reactid$",
    r"__next$",
    r"__nuxt$",
    r"app-root$",
    r"mat-",
    r"md-",
    r"mdc-",
    r"btn$",
    r"fa-",
    r"glyphicon",
    r"icon-",
    r"polyfill",
    r"webpack",
    r"main\.\w+\.js$",
    r"vendor\.\w+\.js$",
    r"runtime\.\w+\.js$",
    r"chunk\.\w+\.js$",
    // Common CMS/framework paths
    r"/wp-content/",
    r"/wp-includes/",
    r"/xmlrpc\.php",
    r"/node_modules/",
    r"/vendor/",
    // Generic paths
    r"/admin$",
    r"/api$",
    r"/login$",
    r"/home$",
    r"/index$",
    // Generic attributes
    r#"class=""#,
    r#"id=""#,
    r#"style=""#,
    r"no-js",
];

/// Terms too common to ever be worth a query, matched whole against the
/// lowercased value.
const QUERY_BLACKLIST: &[&str] = &[
    // Common page elements
    "login", "logout", "register", "signup", "sign up", "sign in", "password", "email",
    "username", "submit", "search", "home", "index", "welcome", "dashboard", "admin",
    "settings", "profile", "contact", "about", "help", "faq", "terms", "privacy",
    // Common frameworks/libraries
    "bootstrap", "jquery", "font-awesome", "fontawesome", "react", "angular", "vue",
    "tailwind", "materialize", "foundation", "twitter", "facebook", "google", "github",
    "linkedin",
    // Common CSS/JS artifacts
    "normalize", "reset", "polyfill", "vendor", "bundle", "chunk", "main.js", "app.js",
    "style.css", "main.css",
    // Common meta content
    "utf-8", "viewport", "robots", "description", "keywords",
    // Single common words
    "the", "and", "for", "with", "from", "that", "this",
];

/// Title fragments that are versions, years, or release tags rather than
/// product names. Matched case-insensitively, anchored.
const VERSION_PATTERNS: &[&str] = &[
    r"v?\d+(\.\d+)*$",
    r"v?\d+(\.\d+)*\s*[\*\-].*$",
    r"\d{4}$",
    r"version\s*\d+",
    r"\*.*\*$",
    r"(alpha|beta|dev|rc|release)\s*\d*$",
];

/// Generic title words never worth querying on their own.
pub(crate) const GENERIC_TITLE_WORDS: &[&str] =
    &["home", "index", "welcome", "login", "dashboard", "admin"];

static GENERIC_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    GENERIC_PATTERNS
        .iter()
        .filter_map(|p| {
            regex::RegexBuilder::new(&format!("^(?:{p})"))
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect()
});

static VERSION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    VERSION_PATTERNS
        .iter()
        .filter_map(|p| {
            regex::RegexBuilder::new(&format!("^(?:{p})"))
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect()
});

static BLACKLIST: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| QUERY_BLACKLIST.iter().copied().collect());

/// Whether a query value is too generic to be useful.
///
/// Values shorter than three characters, blacklisted terms, and values
/// matching a generic pattern are all rejected.
#[must_use]
pub fn is_query_blacklisted(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.len() < 3 {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    if BLACKLIST.contains(lowered.as_str()) {
        return true;
    }
    GENERIC_RES.iter().any(|re| re.is_match(&lowered))
}

/// Whether a title fragment looks like a version, year, or release tag.
#[must_use]
pub fn is_version_fragment(value: &str) -> bool {
    VERSION_RES.iter().any(|re| re.is_match(value))
}
