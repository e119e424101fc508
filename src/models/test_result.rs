//! Per-test outcome rows, children of a test job.

use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::test_results;

/// Outcome of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Unknown,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "Passed",
            TestStatus::Failed => "Failed",
            TestStatus::Skipped => "Skipped",
            TestStatus::Unknown => "Unknown",
        }
    }

    /// Normalize a raw report attribute. Case-insensitive; unrecognized
    /// values map to `Unknown`.
    pub fn normalize(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pass" | "passed" => TestStatus::Passed,
            "fail" | "failed" => TestStatus::Failed,
            "skip" | "skipped" | "ignored" => TestStatus::Skipped,
            _ => TestStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = test_results)]
pub struct TestResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub test_name: String,
    pub status: String,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = test_results)]
pub struct NewTestResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub test_name: String,
    pub status: String,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_case_insensitive() {
        assert_eq!(TestStatus::normalize("PASSED"), TestStatus::Passed);
        assert_eq!(TestStatus::normalize("Pass"), TestStatus::Passed);
        assert_eq!(TestStatus::normalize("fail"), TestStatus::Failed);
        assert_eq!(TestStatus::normalize("Ignored"), TestStatus::Skipped);
        assert_eq!(TestStatus::normalize("skip"), TestStatus::Skipped);
        assert_eq!(TestStatus::normalize("flaky"), TestStatus::Unknown);
    }
}
