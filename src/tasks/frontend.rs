//! Frontend mode: generate a static page, strip active content, save it.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::engine::extract_code_block;
use crate::tasks::{require_description, TaskContext, TaskKind};
use crate::util::{artifact_name, write_atomically};

#[derive(Debug, Serialize)]
pub struct FrontendReport {
    pub html: String,
    pub path: PathBuf,
}

struct Sanitizers {
    script: Regex,
    js_url: Regex,
    handler: Regex,
}

fn sanitizers() -> &'static Sanitizers {
    static SANITIZERS: OnceLock<Sanitizers> = OnceLock::new();
    SANITIZERS.get_or_init(|| Sanitizers {
        script: Regex::new(r"(?is)<script\b.*?>.*?</script\s*>").expect("script regex compiles"),
        js_url: Regex::new(r"(?i)javascript:").expect("js url regex compiles"),
        handler: Regex::new(r"(?i)\bon\w+\s*=").expect("handler regex compiles"),
    })
}

/// Remove script blocks, `javascript:` URLs and inline event handlers.
///
/// Pattern based, like the validator. It is a convenience filter for the
/// preview, not an HTML sanitizer.
pub fn sanitize_html(html: &str) -> String {
    let s = sanitizers();
    let html = s.script.replace_all(html, "");
    let html = s.js_url.replace_all(&html, "");
    let html = s.handler.replace_all(&html, "");
    html.into_owned()
}

pub async fn generate_page(ctx: &TaskContext, description: &str) -> Result<FrontendReport> {
    require_description(description, "a website type")?;

    let reply = ctx
        .generator
        .generate(TaskKind::Frontend, description)
        .await
        .context("Error generating frontend code")?;

    let html = extract_code_block(&reply, TaskKind::Frontend.code_language());
    let html = sanitize_html(&html);

    let name = artifact_name("generated_site", description, "html");
    let path = write_atomically(&ctx.output_dir(), &name, &html)
        .context("Failed to save HTML file")?;

    tracing::info!(path = %path.display(), bytes = html.len(), "page generated");

    Ok(FrontendReport { html, path })
}

/// Hand the saved page to the platform's default opener.
pub fn open_in_browser(path: &Path) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Unable to resolve {:?}", path))?;
    let url = format!("file://{}", path.display());

    let mut cmd = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        std::process::Command::new("xdg-open")
    };

    cmd.arg(&url)
        .spawn()
        .with_context(|| format!("Could not open browser for {}", url))?;

    Ok(())
}
