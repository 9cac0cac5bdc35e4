use serde::{Deserialize, Serialize};

/// How far a pipeline run goes once the code has been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Validate,
    Execute,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Execute
    }
}
