use serde::{Deserialize, Serialize};

/// Lifecycle of a background batch job as reported to polling clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    /// Percentage of settled images, 0..=100.
    InProgress(u32),
    Completed(String),
    Failed(String),
}

impl JobStatus {
    /// Builds an `InProgress` status from a settled/total pair.
    pub fn progress(completed: usize, total: usize) -> Self {
        let percent = if total > 0 {
            (completed as f32 / total as f32 * 100.0) as u32
        } else {
            0
        };
        JobStatus::InProgress(percent.min(100))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed(_) | JobStatus::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_a_percentage_of_settled_items() {
        assert_eq!(JobStatus::progress(0, 7), JobStatus::InProgress(0));
        assert_eq!(JobStatus::progress(3, 7), JobStatus::InProgress(42));
        assert_eq!(JobStatus::progress(7, 7), JobStatus::InProgress(100));
        assert_eq!(JobStatus::progress(0, 0), JobStatus::InProgress(0));
    }

    #[test]
    fn serializes_as_externally_tagged_enum() {
        let json = serde_json::to_string(&JobStatus::InProgress(50)).unwrap();
        assert_eq!(json, r#"{"InProgress":50}"#);
        assert!(JobStatus::Failed("x".into()).is_finished());
        assert!(!JobStatus::Pending.is_finished());
    }
}
