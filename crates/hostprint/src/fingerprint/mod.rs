//! Fingerprint model: the typed description of what identifies a target
//! application and the ordered probe plan used to verify candidates.

mod file;
mod plan;
mod spec;

pub use file::FingerprintFile;
pub use plan::{
    apply_weight_overrides, parse_weight_overrides, CheckType, ExpectedHash, HashType, ProbePlan,
    ProbeStep,
};
pub use spec::{
    ConfidenceLevel, FaviconFingerprint, FingerprintMode, FingerprintSpec, ImageFingerprint,
    PageSignature, SourceType,
};
