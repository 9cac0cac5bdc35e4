//! DSA mode: generate a solution and run it under the executor's timeout.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::engine::events::ExecutionEvent;
use crate::engine::run::run_collected;
use crate::engine::summary::ExecutionSummary;
use crate::engine::{extract_code_block, ExecutionMode};
use crate::tasks::{require_description, TaskContext, TaskKind};

#[derive(Debug, Serialize)]
pub struct DsaReport {
    pub code: String,
    pub summary: ExecutionSummary,
    /// What the panel prints in its output box
    pub text: String,
    pub events: Vec<ExecutionEvent>,
}

pub async fn solve(ctx: &TaskContext, problem: &str) -> Result<DsaReport> {
    require_description(problem, "a problem statement")?;

    let reply = ctx
        .generator
        .generate(TaskKind::Dsa, problem)
        .await
        .context("Error solving DSA problem")?;

    let code = extract_code_block(&reply, TaskKind::Dsa.code_language());

    let (summary, sink) = run_collected(
        &ctx.validator,
        &ctx.executor,
        &code,
        ExecutionMode::Execute,
        None,
    )
    .await;

    let text = summary.render_text();
    tracing::info!(
        execution_id = %summary.execution_id,
        status = ?summary.status,
        "DSA solution processed"
    );

    Ok(DsaReport {
        code,
        summary,
        text,
        events: sink.into_events(),
    })
}
