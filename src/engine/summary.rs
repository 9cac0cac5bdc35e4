use crate::engine::{ExecutionResult, ValidationResult};
use crate::execution_id::ExecutionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub validation: ValidationResult,
    pub result: Option<ExecutionResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    ValidatedOnly,
    ValidationFailed,
    Executed,
}

impl ExecutionSummary {
    pub fn validation_failed(execution_id: ExecutionId, validation: ValidationResult) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::ValidationFailed,
            validation,
            result: None,
        }
    }

    pub fn validated_only(execution_id: ExecutionId, validation: ValidationResult) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::ValidatedOnly,
            validation,
            result: None,
        }
    }

    pub fn executed(
        execution_id: ExecutionId,
        validation: ValidationResult,
        result: ExecutionResult,
    ) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::Executed,
            validation,
            result: Some(result),
        }
    }

    /// True when validation passed and, if it ran, the snippet succeeded.
    pub fn ok(&self) -> bool {
        match self.status {
            ExecutionStatus::ValidationFailed => false,
            ExecutionStatus::ValidatedOnly => true,
            ExecutionStatus::Executed => self.result.as_ref().is_some_and(|r| r.succeeded),
        }
    }

    /// One block of text describing the run, as shown in the panel's output box.
    pub fn render_text(&self) -> String {
        match (&self.status, &self.result) {
            (ExecutionStatus::ValidationFailed, _) => format!(
                "Security validation failed:\n{}",
                self.validation.issues.join("\n")
            ),
            (ExecutionStatus::ValidatedOnly, _) | (_, None) => "Validation passed".to_string(),
            (ExecutionStatus::Executed, Some(r)) => {
                if r.succeeded {
                    r.output.clone()
                } else if r.timed_out() {
                    "Execution timed out".to_string()
                } else {
                    format!("Execution error:\n{}", r.error)
                }
            }
        }
    }
}
