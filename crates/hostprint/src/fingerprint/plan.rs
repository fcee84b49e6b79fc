//! Probe plans: the ordered, weighted checks run against each candidate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Weight the retired flat `page_signature` entry used to carry. Plans
/// that still have it are migrated to the split title/body scoring at
/// load time.
pub(crate) const LEGACY_PAGE_SIGNATURE_WEIGHT: u32 = 30;

/// The kind of check a probe step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// Hash the favicon bytes and compare
    FaviconHash,
    /// Hash an image (exact or perceptual) and compare
    ImageHash,
    /// Match title/body patterns and status against a page
    PageSignature,
}

/// Hash algorithm named by an expected-hash check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashType {
    /// Shodan-convention MurmurHash3
    Mmh3,
    /// SHA-256
    Sha256,
    /// MD5
    Md5,
    /// 64-bit perceptual hash
    Phash,
}

/// Expected hash for favicon/image checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedHash {
    /// Which algorithm to compute
    pub hash_type: HashType,
    /// Primary expected value
    pub value: String,
    /// Alternative values that also count as a match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_values: Vec<String>,
}

impl ExpectedHash {
    /// Primary value followed by alternates
    #[must_use]
    pub fn all_values(&self) -> Vec<&str> {
        let mut values = Vec::with_capacity(1 + self.alt_values.len());
        values.push(self.value.as_str());
        values.extend(self.alt_values.iter().map(String::as_str));
        values
    }
}

/// A single probe step. Self-contained: everything needed to execute the
/// check against a base URL lives on the step, so plans survive being
/// shipped around without the fingerprint they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeStep {
    /// 1-based position in the plan; strictly increasing across the plan
    pub order: u32,
    /// Relative path, e.g. `/favicon.ico` or `/dvwa/images/logo.png`
    pub url_path: String,
    /// What this step checks for, for the report reader
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Which check to run
    pub check_type: CheckType,

    /// Expected hash for favicon/image checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<ExpectedHash>,
    /// Title regex for page-signature checks (alternation allowed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_title_pattern: Option<String>,
    /// Literal body keywords for page-signature checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_body_patterns: Option<Vec<String>>,
    /// Required HTTP status for page-signature checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,

    /// Points awarded on a full match
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Ordered probe steps plus scoring defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbePlan {
    /// Steps in execution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_steps: Vec<ProbeStep>,
    /// Advisory minimum signal count; not consulted by the scorer
    #[serde(default = "default_minimum_matches")]
    pub minimum_matches_required: u32,
    /// Default points per check type, applied to steps that were not
    /// individually weighted
    #[serde(default = "default_weights_table")]
    pub default_weights: BTreeMap<CheckType, u32>,
}

fn default_minimum_matches() -> u32 {
    2
}

fn default_weights_table() -> BTreeMap<CheckType, u32> {
    BTreeMap::from([(CheckType::FaviconHash, 80), (CheckType::ImageHash, 50)])
}

impl Default for ProbePlan {
    fn default() -> Self {
        Self {
            probe_steps: Vec::new(),
            minimum_matches_required: default_minimum_matches(),
            default_weights: default_weights_table(),
        }
    }
}

impl ProbePlan {
    /// Validate the ordering invariant: step orders strictly increase.
    pub fn validate(&self) -> Result<()> {
        for pair in self.probe_steps.windows(2) {
            if pair[1].order <= pair[0].order {
                return Err(Error::InvalidFingerprint(format!(
                    "probe step order {} does not increase after {}",
                    pair[1].order, pair[0].order
                )));
            }
        }
        Ok(())
    }

    /// Apply the default weights table to every step of a matching type.
    ///
    /// With `force`, existing weights are overwritten; otherwise only
    /// steps still at the placeholder weight (1) are touched.
    pub fn apply_default_weights(&mut self, custom: Option<&BTreeMap<CheckType, u32>>, force: bool) {
        let defaults = custom.unwrap_or(&self.default_weights).clone();
        for step in &mut self.probe_steps {
            if force || step.weight == 1 {
                if let Some(&weight) = defaults.get(&step.check_type) {
                    step.weight = weight;
                }
            }
        }
    }

    /// Set the weight of every step with the given check type
    pub fn set_weight_for_type(&mut self, check_type: CheckType, weight: u32) {
        for step in &mut self.probe_steps {
            if step.check_type == check_type {
                step.weight = weight;
            }
        }
    }

    /// Set the weight of the step with the given order number
    pub fn set_weight_by_order(&mut self, order: u32, weight: u32) -> bool {
        for step in &mut self.probe_steps {
            if step.order == order {
                step.weight = weight;
                return true;
            }
        }
        false
    }

    /// A copy of this plan with every path moved under `prefix`
    /// (e.g. `/dvwa`), used for the last-chance prefix retry.
    #[must_use]
    pub fn with_path_prefix(&self, prefix: &str) -> Self {
        let mut plan = self.clone();
        for step in &mut plan.probe_steps {
            step.url_path = format!("{prefix}{}", step.url_path);
            if !step.description.is_empty() {
                step.description = format!("{} (prefixed: {prefix})", step.description);
            }
        }
        plan
    }
}

/// Parse a weight-override string into a key → points map.
///
/// Two key forms are accepted, mirroring the CLI flag:
/// by type (`favicon:80,image:50,title:15`) and by order (`1:100,2:50`).
/// Malformed entries are skipped.
#[must_use]
pub fn parse_weight_overrides(weights: &str) -> BTreeMap<String, u32> {
    let mut parsed = BTreeMap::new();
    for part in weights.split(',') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        if let Ok(points) = value.trim().parse::<u32>() {
            parsed.insert(key.trim().to_lowercase(), points);
        }
    }
    parsed
}

/// Apply parsed weight overrides to a plan. Digit keys address a probe by
/// order; named keys address all probes of a type (shorthand accepted).
pub fn apply_weight_overrides(plan: &mut ProbePlan, overrides: &BTreeMap<String, u32>) {
    for (key, &weight) in overrides {
        if key.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(order) = key.parse::<u32>() {
                plan.set_weight_by_order(order, weight);
            }
            continue;
        }
        match key.as_str() {
            "favicon" | "favicon_hash" => plan.set_weight_for_type(CheckType::FaviconHash, weight),
            "image" | "image_hash" => plan.set_weight_for_type(CheckType::ImageHash, weight),
            "page" | "page_signature" => {
                plan.set_weight_for_type(CheckType::PageSignature, weight);
            }
            _ => {}
        }
    }
}
