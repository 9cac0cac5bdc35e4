use std::time::Duration;

use crate::engine::events::{execution_created, ExecutionEvent, ExecutionEventKind};
use crate::engine::sink::EventSink;
use crate::engine::summary::ExecutionSummary;
use crate::engine::{ExecutionMode, Executor, Validator};
use crate::execution_id::ExecutionId;
use crate::sinks::collecting::CollectingEventSink;

/// Validate `code` and, unless validation fails or `mode` is validate-only,
/// execute it. Every stage is reported to `sink`.
///
/// `timeout` overrides the executor's configured default for this run.
pub async fn run_pipeline<S: EventSink>(
    validator: &Validator,
    executor: &Executor,
    code: &str,
    mode: ExecutionMode,
    timeout: Option<Duration>,
    sink: &mut S,
) -> ExecutionSummary {
    let execution_id = ExecutionId::new();

    // ---- execution created ----
    sink.emit(execution_created(&execution_id));

    // ---- validation ----
    sink.emit(ExecutionEvent::new(
        &execution_id,
        ExecutionEventKind::ValidationStarted,
    ));

    let validation = validator.validate(code);

    if !validation.is_valid() {
        tracing::info!(
            execution_id = %execution_id,
            issues = validation.issues.len(),
            "validation failed; execution skipped"
        );
        sink.emit(ExecutionEvent::new(
            &execution_id,
            ExecutionEventKind::ValidationFailed,
        ));

        return ExecutionSummary::validation_failed(execution_id, validation);
    }

    sink.emit(ExecutionEvent::new(
        &execution_id,
        ExecutionEventKind::ValidationSucceeded,
    ));

    // ---- validate-only mode ----
    if mode == ExecutionMode::Validate {
        return ExecutionSummary::validated_only(execution_id, validation);
    }

    // ---- execution ----
    sink.emit(ExecutionEvent::new(
        &execution_id,
        ExecutionEventKind::ExecutionStarted,
    ));

    let timeout = timeout.unwrap_or(executor.settings().timeout);
    let result = executor.execute_with_timeout(code, timeout).await;

    let finished = if result.timed_out() {
        ExecutionEventKind::ExecutionTimedOut
    } else {
        ExecutionEventKind::ExecutionFinished
    };
    sink.emit(ExecutionEvent::new(&execution_id, finished));

    ExecutionSummary::executed(execution_id, validation, result)
}

/// Run the pipeline with a fresh in-memory sink and hand both back.
///
/// The sink is owned here so no mutable trait object is held across
/// `.await`, keeping the future `Send` for axum handlers.
pub async fn run_collected(
    validator: &Validator,
    executor: &Executor,
    code: &str,
    mode: ExecutionMode,
    timeout: Option<Duration>,
) -> (ExecutionSummary, CollectingEventSink) {
    let mut sink = CollectingEventSink::new();
    let summary = run_pipeline(validator, executor, code, mode, timeout, &mut sink).await;
    (summary, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::summary::ExecutionStatus;
    use crate::engine::{DenyList, ExecutorSettings};
    use tempfile::TempDir;

    fn parts(scratch: &TempDir) -> (Validator, Executor) {
        let validator = Validator::new(DenyList::defaults().unwrap());
        let executor = Executor::new(ExecutorSettings {
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..ExecutorSettings::default()
        });
        (validator, executor)
    }

    fn kinds(sink: &CollectingEventSink) -> Vec<ExecutionEventKind> {
        sink.events().iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn hello_runs_end_to_end() {
        let scratch = TempDir::new().unwrap();
        let (validator, executor) = parts(&scratch);

        let (summary, sink) = run_collected(
            &validator,
            &executor,
            "print(\"hello\")",
            ExecutionMode::Execute,
            Some(Duration::from_secs(5)),
        )
        .await;

        assert!(summary.validation.valid);
        assert!(summary.validation.issues.is_empty());
        assert_eq!(summary.status, ExecutionStatus::Executed);
        let result = summary.result.as_ref().unwrap();
        assert!(result.succeeded);
        assert_eq!(result.output, "hello\n");
        assert_eq!(
            kinds(&sink),
            vec![
                ExecutionEventKind::ExecutionCreated,
                ExecutionEventKind::ValidationStarted,
                ExecutionEventKind::ValidationSucceeded,
                ExecutionEventKind::ExecutionStarted,
                ExecutionEventKind::ExecutionFinished,
            ]
        );
        assert!(sink
            .events()
            .iter()
            .all(|e| e.execution_id == summary.execution_id));
    }

    #[tokio::test]
    async fn denied_code_is_never_executed() {
        let scratch = TempDir::new().unwrap();
        let (validator, executor) = parts(&scratch);

        let (summary, sink) = run_collected(
            &validator,
            &executor,
            "import os; os.system(\"rm -rf /\")",
            ExecutionMode::Execute,
            None,
        )
        .await;

        assert_eq!(summary.status, ExecutionStatus::ValidationFailed);
        assert!(!summary.validation.valid);
        assert_eq!(
            summary.validation.issues,
            vec!["disallowed call: os.system".to_string()]
        );
        assert!(summary.result.is_none());
        assert!(!kinds(&sink).contains(&ExecutionEventKind::ExecutionStarted));
    }

    #[tokio::test]
    async fn validate_mode_stops_before_execution() {
        let scratch = TempDir::new().unwrap();
        let (validator, executor) = parts(&scratch);

        let (summary, sink) = run_collected(
            &validator,
            &executor,
            "print(1)",
            ExecutionMode::Validate,
            None,
        )
        .await;

        assert_eq!(summary.status, ExecutionStatus::ValidatedOnly);
        assert!(summary.ok());
        assert_eq!(
            kinds(&sink).last(),
            Some(&ExecutionEventKind::ValidationSucceeded)
        );
    }

    #[tokio::test]
    async fn timeout_is_reported_as_event() {
        let scratch = TempDir::new().unwrap();
        let (validator, executor) = parts(&scratch);

        let (summary, sink) = run_collected(
            &validator,
            &executor,
            "while True: pass",
            ExecutionMode::Execute,
            Some(Duration::from_secs(2)),
        )
        .await;

        let result = summary.result.as_ref().unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.error, "timed out");
        assert_eq!(
            kinds(&sink).last(),
            Some(&ExecutionEventKind::ExecutionTimedOut)
        );
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
