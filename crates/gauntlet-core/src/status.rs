//! Run status and aggregation order.

use serde::{Deserialize, Serialize};

/// Final status of a run. The variant order is the aggregation order: a
/// group's status is the maximum of its children's statuses, so `Aborted`
/// dominates everything and `Passed` only survives if nothing else happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Passed,
    Failed,
    Timeout,
    Error,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "Passed",
            RunStatus::Failed => "Failed",
            RunStatus::Timeout => "Timeout",
            RunStatus::Error => "Error",
            RunStatus::Aborted => "Aborted",
        }
    }

    /// True when a retry-on-error control should re-attempt this outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RunStatus::Error | RunStatus::Timeout)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate child statuses into a group status. Empty input is `Passed`.
pub fn aggregate<I: IntoIterator<Item = RunStatus>>(children: I) -> RunStatus {
    children
        .into_iter()
        .max()
        .unwrap_or(RunStatus::Passed)
}

/// What kind of entity a run executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunType {
    TestCase,
    TestSuite,
    TestPlan,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::TestCase => "TestCase",
            RunType::TestSuite => "TestSuite",
            RunType::TestPlan => "TestPlan",
        }
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
