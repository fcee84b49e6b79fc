//! Operator-in-the-loop decision points.
//!
//! The discovery engine has two places where a human can steer a run:
//! reviewing the planned queries before any API credit is spent, and
//! deciding whether to push on after a plugin error. The terminal I/O
//! lives in the CLI; the engine only sees this trait.

use crate::discovery::DiscoveryQuery;

/// Operator decision for a single planned query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Run the query as-is
    Approve,
    /// Skip this query
    Deny,
    /// Run the query with a replacement value
    Modify(String),
    /// Approve this and every remaining query without prompting
    RunAll,
    /// Skip this and every remaining query
    SkipAll,
}

/// Interface the engines use to consult the operator.
pub trait OperatorPrompt: Send + Sync {
    /// Review one planned query. `index` is 1-based; `total` is the plan
    /// length.
    fn review_query(&self, query: &DiscoveryQuery, index: usize, total: usize) -> ReviewDecision;

    /// A plugin failed mid-run; should the remaining queries still run?
    fn continue_after_error(&self, error: &str) -> bool;
}

/// Batch implementation: approves every query and stops on the first
/// plugin error, preserving results gathered so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoPrompt;

impl OperatorPrompt for AutoPrompt {
    fn review_query(&self, _query: &DiscoveryQuery, _index: usize, _total: usize) -> ReviewDecision {
        ReviewDecision::Approve
    }

    fn continue_after_error(&self, _error: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::QueryType;

    #[test]
    fn test_auto_prompt_approves_and_aborts() {
        let prompt = AutoPrompt;
        let query = DiscoveryQuery::new(QueryType::FaviconHash, "-1");
        assert_eq!(prompt.review_query(&query, 1, 1), ReviewDecision::Approve);
        assert!(!prompt.continue_after_error("rate limited"));
    }
}
