use serde::{Deserialize, Serialize};

pub mod events;
pub mod execute;
pub mod extract;
pub mod mode;
pub mod run;
pub mod sink;
pub mod summary;
pub mod validate;

pub use execute::{Executor, ExecutorSettings};
pub use extract::extract_code_block;
pub use mode::ExecutionMode;
pub use validate::{DenyList, Validator};

/* ---------------- execution output ---------------- */

/// Terminal state of one executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed,
    Crashed,
    TimedOut,
    LaunchFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub output: String,
    pub error: String,
    pub outcome: ExecutionOutcome,
    pub exit_code: Option<i32>,
    pub duration_ms: u128,
    pub max_rss_kb: Option<u64>,
}

impl ExecutionResult {
    /// Failure before the child ever ran (transient file or spawn).
    pub fn launch_failed(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: String::new(),
            error: error.into(),
            outcome: ExecutionOutcome::LaunchFailed,
            exit_code: None,
            duration_ms: 0,
            max_rss_kb: None,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.outcome == ExecutionOutcome::TimedOut
    }
}

/* ---------------- validation ---------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn push_issue(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.issues.push(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.valid && self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_issue_marks_invalid() {
        let mut result = ValidationResult::ok();
        assert!(result.is_valid());

        result.push_issue("disallowed call: eval");
        assert!(!result.valid);
        assert!(!result.is_valid());
        assert_eq!(result.issues, vec!["disallowed call: eval".to_string()]);
    }

    #[test]
    fn launch_failure_is_not_success() {
        let result = ExecutionResult::launch_failed("Failed to spawn python3");
        assert!(!result.succeeded);
        assert_eq!(result.outcome, ExecutionOutcome::LaunchFailed);
        assert!(!result.timed_out());
    }
}
