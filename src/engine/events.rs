use crate::execution_id::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEventKind {
    ExecutionCreated,
    ValidationStarted,
    ValidationFailed,
    ValidationSucceeded,
    ExecutionStarted,
    ExecutionFinished,
    ExecutionTimedOut,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    pub kind: ExecutionEventKind,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn new(execution_id: &ExecutionId, kind: ExecutionEventKind) -> Self {
        Self {
            execution_id: execution_id.clone(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

pub fn execution_created(execution_id: &ExecutionId) -> ExecutionEvent {
    ExecutionEvent::new(execution_id, ExecutionEventKind::ExecutionCreated)
}
