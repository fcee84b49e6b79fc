//! # HostPrint
//!
//! Fingerprint-driven reconnaissance: find deployments of a known web
//! application (or brand) across the public Internet.
//!
//! The pipeline has three phases. Phase 1 produces a *fingerprint*, a
//! bundle of verifiable signals (favicon hash, image hashes, page title
//! and body patterns); its synthesis is an external concern and this
//! crate consumes its output. The crate implements:
//!
//! - **Phase 2, passive discovery** ([`discovery`]): translate the
//!   fingerprint into ranked queries, fan them across discovery plugins
//!   (Shodan, Censys, …) with per-query caching, then deduplicate and
//!   optionally enrich the returned hosts into a candidate set.
//! - **Phase 3, active verification** ([`verify`]): probe each candidate
//!   with the fingerprint's ordered plan, additively score the matches
//!   with early termination, retry under the alternate scheme and the
//!   derived app prefix when the score is low, and harvest TLS
//!   certificates from hosts that look like hits.
//!
//! Discovery sources are plugins: implement
//! [`discovery::DiscoveryPlugin`] in your own crate and register it with
//! the [`discovery::PluginRegistry`] at startup. The bundled plugins live
//! in `hostprint-shodan` and `hostprint-censys`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hostprint::config::{DiscoveryConfig, ScoringConfig, VerificationConfig};
//! use hostprint::discovery::{DiscoveryEngine, PluginRegistry};
//! use hostprint::fingerprint::FingerprintFile;
//! use hostprint::prompt::AutoPrompt;
//! use hostprint::verify::VerificationEngine;
//!
//! # async fn run() -> hostprint::Result<()> {
//! let fingerprint = FingerprintFile::load("output/fingerprints/dvwa.json")?;
//! let registry = PluginRegistry::global();
//!
//! let discovery = DiscoveryEngine::new(DiscoveryConfig::new())?;
//! let summary = discovery
//!     .discover(&fingerprint.fingerprint_spec, registry, &AutoPrompt, None)
//!     .await?;
//!
//! let verifier = VerificationEngine::new(VerificationConfig::new(), ScoringConfig::new());
//! let report = verifier
//!     .verify_candidates(&fingerprint, summary.candidates)
//!     .await?;
//! println!("verified: {}", report.verified_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod enrich;
mod error;
pub mod export;
pub mod fingerprint;
pub mod hashes;
pub mod prompt;
pub mod util;
pub mod verify;

pub use error::{Error, Result};
