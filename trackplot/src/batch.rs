use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::TrackError;

/// What to do when a single source record cannot be turned into a track.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run on the first failing record.
    Abort,
    /// Log the failure, remember it, and continue with the next record.
    Skip,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Abort
    }
}

#[derive(Debug)]
pub struct RecordFailure {
    pub record: String,
    pub error: TrackError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    policy: FailurePolicy,
    failures: Vec<RecordFailure>,
}

impl BatchReport {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            failures: Vec::new(),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Apply the failure policy to one record's result. `Ok(None)` means the
    /// record failed and was skipped.
    pub fn settle<T>(
        &mut self,
        record: &str,
        result: Result<T, TrackError>,
    ) -> Result<Option<T>, TrackError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) => match self.policy {
                FailurePolicy::Abort => Err(error),
                FailurePolicy::Skip => {
                    warn!("Skipping {}: {} ({})", record, error, error.kind());
                    self.failures.push(RecordFailure {
                        record: record.to_string(),
                        error,
                    });
                    Ok(None)
                }
            },
        }
    }

    pub fn failures(&self) -> &[RecordFailure] {
        &self.failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut out = format!("{} record(s) failed", self.failures.len());
        for failure in &self.failures {
            out.push_str(&format!(
                "\n  - {}: {}: {}",
                failure.record,
                failure.error.kind(),
                failure.error
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> Result<u32, TrackError> {
        Err(TrackError::malformed("row 3", "bad latitude"))
    }

    #[test]
    fn abort_propagates_first_error() {
        let mut report = BatchReport::new(FailurePolicy::Abort);
        assert!(report.settle("row 3", failing()).is_err());
        assert!(report.is_clean());
    }

    #[test]
    fn skip_records_failure_and_continues() {
        let mut report = BatchReport::new(FailurePolicy::Skip);
        assert_eq!(report.settle("row 1", Ok(7)).unwrap(), Some(7));
        assert_eq!(report.settle("row 3", failing()).unwrap(), None);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].record, "row 3");
        let summary = report.summary();
        assert!(summary.starts_with("1 record(s) failed"));
        assert!(summary.contains("MalformedDataError"));
    }

    #[test]
    fn policy_parses_from_lowercase() {
        let policy: FailurePolicy = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(policy, FailurePolicy::Skip);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Abort);
    }
}
