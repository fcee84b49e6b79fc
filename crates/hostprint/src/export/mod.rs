//! Output documents: candidates file, verification report, CSV.

mod candidates;
mod csv_export;
mod report;

pub use candidates::{read_candidates, write_candidates};
pub use csv_export::write_results_csv;
pub use report::write_verification_report;
