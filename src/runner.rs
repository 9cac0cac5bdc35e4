// src/runner.rs

use crate::cli::{Cli, Command};
use crate::config::{Config, OutputMode};
use crate::engine::run::run_pipeline;
use crate::engine::summary::{ExecutionStatus, ExecutionSummary};
use crate::engine::{extract_code_block, ExecutionMode, Executor, Validator};
use crate::generator::{CodeGenerator, GeminiGenerator, StaticReply};
use crate::runtime::{self, AppState};
use crate::sinks::logging::LoggingEventSink;
use crate::tasks::backend::{self, LaunchStatus, ServiceRegistry};
use crate::tasks::{dsa, frontend, TaskContext};
use crate::util::read_to_string;

use anyhow::{bail, Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;

/// Entry point from `main.rs`.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init => init_scaffold(),

        Command::Extract { file, lang } => {
            let reply = read_to_string(&file)?;
            print!("{}", extract_code_block(&reply, &lang));
            Ok(())
        }

        Command::Run {
            file,
            timeout,
            watch,
            output,
        } => {
            if timeout == Some(0) {
                bail!("--timeout must be greater than zero");
            }
            let overrides = RunOverrides {
                timeout_secs: timeout,
                mode: output.as_deref().map(parse_output_mode).transpose()?,
            };

            if watch {
                execute_with_watch(&cli.config, file, overrides).await
            } else {
                let cfg = overrides.apply(Config::load_or_default(&cli.config)?);
                let summary = run_file(&cfg, &file).await?;
                println!("{}", render_summary(cfg.output.mode, &file, &summary)?);

                if !summary.ok() {
                    bail!("Run failed");
                }
                Ok(())
            }
        }

        Command::Validate { file } => {
            let cfg = Config::load_or_default(&cli.config)?;
            let validator = cfg.validator()?;
            let code = read_to_string(&file)?;
            let result = validator.validate(&code);

            if result.is_valid() {
                println!("OK {}", file.display());
                Ok(())
            } else {
                for issue in &result.issues {
                    eprintln!("✖ {}", issue);
                }
                bail!("Security validation failed: {}", file.display());
            }
        }

        Command::Scan { dir } => {
            let cfg = Config::load_or_default(&cli.config)?;
            scan_dir(&cfg.validator()?, &dir)
        }

        Command::Solve { description, reply } => {
            let cfg = Config::load_or_default(&cli.config)?;
            let mode = cfg.output.mode;
            let ctx = task_context(cfg, reply.as_deref())?;

            let report = dsa::solve(&ctx, &description).await?;
            match mode {
                OutputMode::Stdout => println!("{}", serde_json::to_string(&report)?),
                OutputMode::Pretty => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputMode::Simple => {
                    println!("{}", report.code.trim_end());
                    println!();
                    println!("Output:");
                    println!("{}", report.text.trim_end());
                }
            }

            if !report.summary.ok() {
                bail!("Solution did not run cleanly");
            }
            Ok(())
        }

        Command::Frontend {
            description,
            reply,
            open,
        } => {
            let cfg = Config::load_or_default(&cli.config)?;
            let ctx = task_context(cfg, reply.as_deref())?;

            let report = frontend::generate_page(&ctx, &description).await?;
            println!("Saved page to {}", report.path.display());

            if open {
                if let Err(e) = frontend::open_in_browser(&report.path) {
                    let message = format!("{:#}", e);
                    tracing::warn!(error = %message, "could not open browser");
                }
            }
            Ok(())
        }

        Command::Backend { description, reply } => {
            let cfg = Config::load_or_default(&cli.config)?;
            let ctx = task_context(cfg, reply.as_deref())?;
            run_backend(&ctx, &description).await
        }

        Command::Serve { addr } => {
            let cfg = Config::load_or_default(&cli.config)?;
            let addr = addr.unwrap_or_else(|| cfg.server.addr.clone());
            let ctx = task_context(cfg, None)?;
            runtime::serve(&addr, AppState::new(ctx)).await
        }
    }
}

fn parse_output_mode(raw: &str) -> Result<OutputMode> {
    match raw {
        "simple" => Ok(OutputMode::Simple),
        "pretty" => Ok(OutputMode::Pretty),
        "stdout" => Ok(OutputMode::Stdout),
        other => bail!("Unknown output mode: {}", other),
    }
}

fn task_context(cfg: Config, reply: Option<&Path>) -> Result<TaskContext> {
    let generator: Arc<dyn CodeGenerator> = match reply {
        Some(path) => Arc::new(StaticReply::new(read_to_string(path)?)),
        None => Arc::new(GeminiGenerator::new(cfg.generator.clone())?),
    };
    TaskContext::new(cfg, generator)
}

/* ---------------- run ---------------- */

async fn run_file(cfg: &Config, file: &Path) -> Result<ExecutionSummary> {
    let code = read_to_string(file)?;
    let validator = cfg.validator()?;
    let executor = Executor::new(cfg.executor_settings());
    Ok(run_code(&validator, &executor, &code).await)
}

async fn run_code(validator: &Validator, executor: &Executor, code: &str) -> ExecutionSummary {
    let mut sink = LoggingEventSink::new();
    let summary = run_pipeline(
        validator,
        executor,
        code,
        ExecutionMode::Execute,
        None,
        &mut sink,
    )
    .await;

    tracing::debug!(events = sink.emitted(), status = ?summary.status, "run complete");
    summary
}

/* ---------------- watch mode ---------------- */

/// Flags given to `run` that win over config.yaml.
#[derive(Debug, Clone, Copy, Default)]
struct RunOverrides {
    timeout_secs: Option<u64>,
    mode: Option<OutputMode>,
}

impl RunOverrides {
    fn apply(self, mut cfg: Config) -> Config {
        if let Some(t) = self.timeout_secs {
            cfg.execution.timeout_secs = t;
        }
        if let Some(mode) = self.mode {
            cfg.output.mode = mode;
        }
        cfg
    }
}

async fn execute_with_watch(config_path: &Path, file: PathBuf, overrides: RunOverrides) -> Result<()> {
    let (tx, rx) = channel();

    let mut watcher: RecommendedWatcher = Watcher::new(tx, notify::Config::default())
        .context("Failed to initialise file watcher")?;

    watcher.watch(&file, RecursiveMode::NonRecursive)?;
    if config_path.exists() {
        watcher.watch(config_path, RecursiveMode::NonRecursive)?;
    }

    loop {
        clear_screen();

        // Reload config each run so edits apply immediately; CLI values still win
        let cfg = match Config::load_or_default(config_path) {
            Ok(cfg) => overrides.apply(cfg),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                let _ = rx.recv();
                continue;
            }
        };

        match run_file(&cfg, &file).await {
            Ok(summary) => match render_summary(cfg.output.mode, &file, &summary) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("Error: {:#}", e),
            },
            Err(e) => eprintln!("Error: {:#}", e),
        }

        // Block until something changes
        let _ = rx.recv();
    }
}

fn clear_screen() {
    print!("\x1b[2J\x1b[H");
    let _ = std::io::stdout().flush();
}

/* ---------------- scan ---------------- */

fn scan_dir(validator: &Validator, dir: &Path) -> Result<()> {
    let findings = scan_python_files(validator, dir)?;

    if findings.is_empty() {
        bail!("No .py files found under {}", dir.display());
    }

    let use_color = should_use_color();
    let mut failed = 0usize;

    for (path, issues) in &findings {
        if issues.is_empty() {
            println!("{} {}", paint("OK", "32", use_color), path.display());
        } else {
            failed += 1;
            println!(
                "{} {}: {}",
                paint("FAIL", "31", use_color),
                path.display(),
                issues.join("; ")
            );
        }
    }

    if failed > 0 {
        bail!("{} of {} files failed validation", failed, findings.len());
    }
    Ok(())
}

/// Validate every `.py` under `dir`, sorted by path.
fn scan_python_files(validator: &Validator, dir: &Path) -> Result<Vec<(PathBuf, Vec<String>)>> {
    let mut findings = Vec::new();

    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("py")
        {
            continue;
        }

        let code = read_to_string(path)?;
        findings.push((path.to_path_buf(), validator.validate(&code).issues));
    }

    // Stable ordering is nice in CI
    findings.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(findings)
}

/* ---------------- backend ---------------- */

async fn run_backend(ctx: &TaskContext, description: &str) -> Result<()> {
    let registry = ServiceRegistry::new();
    let report = backend::launch_api(ctx, &registry, description).await?;

    match &report.launch {
        LaunchStatus::Rejected { issues } => {
            println!("{}", report.code.trim_end());
            eprintln!("Security issues detected in generated code:");
            for issue in issues {
                eprintln!("- {}", issue);
            }
            bail!("Generated API rejected");
        }
        LaunchStatus::NoFreePort => {
            bail!("Could not find an available port to run the API.");
        }
        LaunchStatus::FailedToStart { output } => {
            eprintln!("API failed to start:");
            eprintln!("{}", output.trim_end());
            bail!("Generated API exited during start-up");
        }
        LaunchStatus::Running { service } => {
            println!("API is running at {}", service.url);
            if let Some(docs) = &service.docs_url {
                println!("Swagger UI: {}", docs);
            }
            println!("Logs: {}", service.log.display());
            println!("Press Ctrl-C to stop.");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            registry.stop_all().await;
            Ok(())
        }
    }
}

/* ---------------- rendering ---------------- */

fn render_summary(mode: OutputMode, file: &Path, summary: &ExecutionSummary) -> Result<String> {
    match mode {
        OutputMode::Stdout => {
            serde_json::to_string(summary).context("Failed to format output as JSON")
        }
        OutputMode::Pretty => {
            serde_json::to_string_pretty(summary).context("Failed to format output as pretty JSON")
        }
        OutputMode::Simple => Ok(format_simple_output(file, summary, should_use_color())),
    }
}

fn format_simple_output(file: &Path, summary: &ExecutionSummary, use_color: bool) -> String {
    let ok = summary.ok();
    let status = if ok { "OK" } else { "FAIL" };
    let status = paint(status, if ok { "32" } else { "31" }, use_color);

    let mut out = String::new();
    out.push_str(&format!("{} {}\n", status, file.display()));

    if summary.status == ExecutionStatus::ValidationFailed {
        out.push_str("issues:\n");
        for issue in &summary.validation.issues {
            out.push_str(&format!("- {}\n", issue));
        }
        return out.trim_end().to_string();
    }

    if let Some(result) = &summary.result {
        out.push_str(&format!("time: {}ms\n", result.duration_ms));

        let mem = result
            .max_rss_kb
            .map(|v| format!("{}kb", v))
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!("memory: {}\n", mem));
    }

    out.push_str("output:\n");
    out.push_str(&summary.render_text());

    out.trim_end().to_string()
}

fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[{}m{}\x1b[0m", color, text)
    } else {
        text.to_string()
    }
}

/* ---------------- init ---------------- */

fn init_scaffold() -> Result<()> {
    write_if_missing(Path::new("config.yaml"), default_config_yaml())?;
    write_if_missing(Path::new(".env.example"), default_env_example())?;
    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        eprintln!("{} already exists (skipping)", path.display());
        return Ok(());
    }

    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    eprintln!("Created {}", path.display());
    Ok(())
}

fn default_config_yaml() -> &'static str {
    r#"
runtime:
  python: python3

execution:
  timeout_secs: 5
  max_timeout_secs: 60
  # scratch_dir: /tmp/devagent

# Replaces the built-in deny-list when present.
# validation:
#   rules:
#     - pattern: '\bos\.system\s*\('
#       message: "disallowed call: os.system"

generator:
  model: gemini-1.5-flash
  api_key_env: GOOGLE_API_KEY

backend:
  port_start: 8000
  port_end: 9000
  startup_wait_secs: 3

server:
  addr: 127.0.0.1:8080

output:
  mode: simple # simple | pretty | stdout
  dir: generated
"#
}

fn default_env_example() -> &'static str {
    r#"GOOGLE_API_KEY=your-gemini-key
DEVAGENT_API_KEY=choose-a-panel-token
"#
}
