//! The fingerprint specification: verifiable signals for one application
//! or brand. Serialization is canonical (absent optionals and empty
//! sequences are omitted), so serialize, parse, serialize again is stable.

use serde::{Deserialize, Serialize};

use crate::hashes::HashBundle;

/// Where the fingerprint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Walked a live deployment
    LiveSite,
    /// Analyzed a source repository
    Repository,
    /// Loaded from an existing fingerprint file
    FingerprintFile,
}

/// Analyst confidence in the fingerprint's distinctiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// Signals are unique to this application
    High,
    /// Signals are distinctive but may collide
    #[default]
    Medium,
    /// Signals are weak; expect false positives
    Low,
}

/// What kind of target the fingerprint describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// A specific software product (favicon path is fixed by the app)
    #[default]
    Application,
    /// A company's assets (favicon location varies per site, hash is the brand)
    Organization,
}

/// Favicon signal: a relative path plus its hashes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaviconFingerprint {
    /// Relative path, e.g. `/favicon.ico`
    pub url_path: String,
    /// Hash bundle for the favicon bytes
    pub hashes: HashBundle,
    /// Content type reported by the origin, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Key image signal: logo or other distinctive static asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFingerprint {
    /// Relative path to the image
    pub url_path: String,
    /// Hash bundle for the image bytes
    pub hashes: HashBundle,
    /// What the image represents, e.g. "main logo"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Content signature for a single page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSignature {
    /// Relative path of the page
    pub url_path: String,
    /// Title regex; `|` alternation allowed, matched case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_pattern: Option<String>,
    /// Literal keywords expected in the body, matched case-insensitively
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_patterns: Vec<String>,
}

/// Complete fingerprint specification for an application or organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintSpec {
    /// Human name of the target, e.g. "Damn Vulnerable Web Application"
    pub app_name: String,
    /// How the fingerprint was produced
    pub source_type: SourceType,
    /// URL or repository the fingerprint was built from
    pub source_location: String,

    /// Favicon signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<FaviconFingerprint>,
    /// Distinctive static images, most distinctive first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_images: Vec<ImageFingerprint>,
    /// Page content signatures, most important first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_signatures: Vec<PageSignature>,

    /// Analyst-facing notes on what makes this target recognizable.
    /// Advisory only, never used for scoring.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distinctive_features: Vec<String>,

    /// Confidence in the fingerprint
    #[serde(default)]
    pub confidence_level: ConfidenceLevel,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Unique run identifier, `YYYYMMDD_HHMMSS_xxxxxx`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// ISO timestamp when the fingerprint was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Application vs organization targeting
    #[serde(default)]
    pub mode: FingerprintMode,
    /// Whether version/year strings were kept in the patterns
    #[serde(default)]
    pub include_version: bool,
}

impl FingerprintSpec {
    /// Minimal spec for the given target name; signals are filled in by
    /// the caller.
    #[must_use]
    pub fn new(
        app_name: impl Into<String>,
        source_type: SourceType,
        source_location: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            source_type,
            source_location: source_location.into(),
            favicon: None,
            key_images: Vec::new(),
            page_signatures: Vec::new(),
            distinctive_features: Vec::new(),
            confidence_level: ConfidenceLevel::default(),
            notes: None,
            run_id: None,
            created_at: None,
            mode: FingerprintMode::default(),
            include_version: false,
        }
    }
}
