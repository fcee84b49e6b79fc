//! Active verification: probe execution, additive scoring, scheme and
//! prefix retries, and TLS certificate harvesting.

mod engine;
mod prefix;
mod probe;
mod result;
mod tls;

pub use engine::VerificationEngine;
pub use prefix::derive_app_prefix;
pub use probe::ProbeExecutor;
pub use result::{
    classify, Classification, ProbeResult, Scheme, VerificationReport, VerificationResult,
};
pub use tls::{TlsClient, TlsInfo};
