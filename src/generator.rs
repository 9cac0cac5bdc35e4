// src/generator.rs

//! Code generation backends.
//!
//! The rest of the crate only sees "description in, reply text out".
//! The reply is free-form and is expected to contain one fenced code block;
//! extraction happens elsewhere.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::tasks::TaskKind;

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, kind: TaskKind, description: &str) -> Result<String>;
}

/* ---------------- prompts ---------------- */

pub fn prompt_for(kind: TaskKind, description: &str) -> String {
    match kind {
        TaskKind::Frontend => format!(
            "Create a complete, single-file {description} website.\n\
             Put all CSS in a <style> tag inside the page and do not use external scripts.\n\
             Return only one fenced ```html code block containing the full document."
        ),
        TaskKind::Backend => format!(
            "Write a small Python HTTP API using FastAPI for these requirements:\n\
             {description}\n\
             Keep everything in one file and start the server at the bottom with\n\
             uvicorn.run(app, host=\"0.0.0.0\", port=8000)\n\
             Do not shell out, delete files or use eval/exec.\n\
             Return only one fenced ```python code block."
        ),
        TaskKind::Dsa => format!(
            "Solve the following data structures and algorithms problem in Python:\n\
             {description}\n\
             Include a short example at the bottom that prints the result for sample input.\n\
             Use only the standard library, no file or process access.\n\
             Return only one fenced ```python code block."
        ),
    }
}

/* ---------------- gemini ---------------- */

pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let key = std::env::var(&self.config.api_key_env).with_context(|| {
            format!(
                "{} is not set (add it to the environment or .env)",
                self.config.api_key_env
            )
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&key)
                .with_context(|| format!("Invalid value in {}", self.config.api_key_env))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl CodeGenerator for GeminiGenerator {
    async fn generate(&self, kind: TaskKind, description: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );
        let body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": prompt_for(kind, description) } ] }
            ]
        });

        tracing::info!(model = %self.config.model, task = ?kind, "requesting generation");

        let resp = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .context("Failed to call the generation API")?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            bail!("Generation request failed: {} {}", status, text);
        }

        let payload: Value =
            serde_json::from_str(&text).context("Generation API returned invalid JSON")?;
        parse_reply(&payload)
    }
}

/// Join the text parts of the first candidate.
pub fn parse_reply(payload: &Value) -> Result<String> {
    let parts = payload
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Generation response has no candidate content"))?;

    let text = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        bail!("Generation response contained no text");
    }

    Ok(text)
}

/* ---------------- static ---------------- */

/// Returns the same reply for every request.
///
/// Used for `--reply <file>` and in tests.
pub struct StaticReply {
    reply: String,
}

impl StaticReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl CodeGenerator for StaticReply {
    async fn generate(&self, kind: TaskKind, _description: &str) -> Result<String> {
        tracing::debug!(task = ?kind, "using static reply");
        Ok(self.reply.clone())
    }
}
