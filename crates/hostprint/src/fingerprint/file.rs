//! The on-disk fingerprint document: spec plus probe plan.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::plan::{CheckType, ProbePlan, LEGACY_PAGE_SIGNATURE_WEIGHT};
use super::spec::FingerprintSpec;
use crate::error::Result;

/// Complete fingerprint output: `{ fingerprint_spec, probe_plan }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintFile {
    /// The signal specification
    pub fingerprint_spec: FingerprintSpec,
    /// The verification plan
    pub probe_plan: ProbePlan,
}

impl FingerprintFile {
    /// Load a fingerprint document, validate the plan ordering, and
    /// migrate legacy weight entries. Documents without a `run_id` get
    /// one assigned so downstream output files stay addressable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let mut file: Self = serde_json::from_str(&raw)?;
        file.probe_plan.validate()?;
        file.migrate_legacy_weights();
        if file.fingerprint_spec.run_id.is_none() {
            file.fingerprint_spec.run_id = Some(crate::util::new_run_id());
        }
        Ok(file)
    }

    /// Write the document as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Older fingerprints carried a flat `page_signature` weight before
    /// the scorer split it into title + per-pattern body points. Drop the
    /// stale defaults entry and reset steps still carrying the flat
    /// weight so the split scoring applies.
    fn migrate_legacy_weights(&mut self) {
        let had_entry = self
            .probe_plan
            .default_weights
            .remove(&CheckType::PageSignature)
            .is_some();
        let mut migrated_steps = 0;
        for step in &mut self.probe_plan.probe_steps {
            if step.check_type == CheckType::PageSignature
                && step.weight == LEGACY_PAGE_SIGNATURE_WEIGHT
            {
                step.weight = 1;
                migrated_steps += 1;
            }
        }
        if had_entry || migrated_steps > 0 {
            debug!(
                migrated_steps,
                removed_default = had_entry,
                "migrated legacy page_signature weights"
            );
        }
    }
}
