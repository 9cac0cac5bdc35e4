//! Backend mode: generate a small API service, save it and launch it.
//!
//! Launched services keep running after the request returns. They are
//! tracked in a `ServiceRegistry` so they can be listed and stopped.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::engine::extract_code_block;
use crate::execution_id::ExecutionId;
use crate::tasks::{require_description, TaskContext, TaskKind};
use crate::util::read_to_string;

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub id: ExecutionId,
    pub pid: Option<u32>,
    pub port: u16,
    pub url: String,
    pub docs_url: Option<String>,
    pub artifact: PathBuf,
    pub log: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LaunchStatus {
    /// Validation found issues; nothing was written or started.
    Rejected { issues: Vec<String> },
    NoFreePort,
    /// The process exited during the start-up grace period.
    FailedToStart { output: String },
    Running { service: ServiceInfo },
}

#[derive(Debug, Serialize)]
pub struct BackendReport {
    pub code: String,
    pub artifact: Option<PathBuf>,
    pub launch: LaunchStatus,
}

/* ---------------- port handling ---------------- */

/// First port in `start..end` that can currently be bound on all interfaces.
pub fn find_available_port(start: u16, end: u16) -> Option<u16> {
    (start..end).find(|port| TcpListener::bind(("0.0.0.0", *port)).is_ok())
}

fn uvicorn_regex() -> &'static Regex {
    static UVICORN: OnceLock<Regex> = OnceLock::new();
    UVICORN.get_or_init(|| {
        Regex::new(r#"uvicorn\.run\(\s*app\s*,\s*host\s*=\s*["']([^"']*)["']\s*,\s*port\s*=\s*\d+"#)
            .expect("uvicorn regex compiles")
    })
}

/// Point the `uvicorn.run(app, host=..., port=N` call at `port`.
///
/// Returns `None` when the code has no call in that shape.
pub fn rewrite_port(code: &str, port: u16) -> Option<String> {
    let re = uvicorn_regex();
    if !re.is_match(code) {
        return None;
    }

    let replaced = re.replace_all(code, |caps: &regex::Captures<'_>| {
        format!("uvicorn.run(app, host=\"{}\", port={}", &caps[1], port)
    });
    Some(replaced.into_owned())
}

/* ---------------- registry ---------------- */

struct LaunchedService {
    info: ServiceInfo,
    child: Child,
}

#[derive(Clone, Default)]
pub struct ServiceRegistry {
    inner: Arc<Mutex<Vec<LaunchedService>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, info: ServiceInfo, child: Child) {
        self.inner.lock().await.push(LaunchedService { info, child });
    }

    /// Services still alive. Exited ones are dropped from the registry.
    pub async fn list(&self) -> Vec<ServiceInfo> {
        let mut guard = self.inner.lock().await;
        guard.retain_mut(|s| matches!(s.child.try_wait(), Ok(None)));
        guard.iter().map(|s| s.info.clone()).collect()
    }

    /// Kill one service. Returns false if the id is unknown.
    pub async fn stop(&self, id: &ExecutionId) -> Result<bool> {
        let mut guard = self.inner.lock().await;
        let Some(idx) = guard.iter().position(|s| &s.info.id == id) else {
            return Ok(false);
        };

        let mut service = guard.remove(idx);
        drop(guard);

        service
            .child
            .kill()
            .await
            .with_context(|| format!("Failed to stop service {}", id))?;
        tracing::info!(id = %id, port = service.info.port, "service stopped");
        Ok(true)
    }

    /// Kill and reap every registered service.
    pub async fn stop_all(&self) {
        let services: Vec<LaunchedService> = self.inner.lock().await.drain(..).collect();
        for mut service in services {
            match service.child.kill().await {
                Ok(()) => tracing::info!(id = %service.info.id, "service stopped"),
                Err(e) => {
                    tracing::warn!(id = %service.info.id, error = %e, "failed to stop service")
                }
            }
        }
    }
}

/* ---------------- launch ---------------- */

pub async fn launch_api(
    ctx: &TaskContext,
    registry: &ServiceRegistry,
    description: &str,
) -> Result<BackendReport> {
    require_description(description, "API requirements")?;

    let reply = ctx
        .generator
        .generate(TaskKind::Backend, description)
        .await
        .context("Error generating backend code")?;

    let code = extract_code_block(&reply, TaskKind::Backend.code_language());

    let validation = ctx.validator.validate(&code);
    if !validation.is_valid() {
        tracing::warn!(issues = ?validation.issues, "generated API rejected");
        return Ok(BackendReport {
            code,
            artifact: None,
            launch: LaunchStatus::Rejected {
                issues: validation.issues,
            },
        });
    }

    let backend = &ctx.config.backend;
    let Some(port) = find_available_port(backend.port_start, backend.port_end) else {
        tracing::warn!(
            start = backend.port_start,
            end = backend.port_end,
            "no free port for generated API"
        );
        let artifact = ctx.write_python("generated_api", description, &code)?;
        return Ok(BackendReport {
            code,
            artifact: Some(artifact),
            launch: LaunchStatus::NoFreePort,
        });
    };

    let code = match rewrite_port(&code, port) {
        Some(updated) => updated,
        None => {
            tracing::warn!(port, "no uvicorn.run(app, host=..., port=...) call; port left as generated");
            code
        }
    };

    let artifact = ctx
        .write_python("generated_api", description, &code)
        .context("Failed to save Python file")?;

    let launch = start_service(ctx, registry, &artifact, port, &code).await?;

    Ok(BackendReport {
        code,
        artifact: Some(artifact),
        launch,
    })
}

async fn start_service(
    ctx: &TaskContext,
    registry: &ServiceRegistry,
    artifact: &Path,
    port: u16,
    code: &str,
) -> Result<LaunchStatus> {
    let log = artifact.with_extension("log");
    let stdout = File::create(&log).with_context(|| format!("Failed to create {:?}", log))?;
    let stderr = stdout
        .try_clone()
        .context("Failed to share service log handle")?;

    let mut child = Command::new(&ctx.config.runtime.python)
        .arg(artifact)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to launch {}", ctx.config.runtime.python))?;

    tokio::time::sleep(Duration::from_secs(ctx.config.backend.startup_wait_secs)).await;

    let polled = match child.try_wait() {
        Ok(polled) => polled,
        Err(e) => {
            if let Err(kill_err) = child.kill().await {
                tracing::warn!(error = %kill_err, "failed to kill unpolled service");
            }
            return Err(e).context("Failed to poll service process");
        }
    };

    match polled {
        None => {
            let url = format!("http://localhost:{}", port);
            let docs_url = code
                .to_lowercase()
                .contains("fastapi")
                .then(|| format!("{}/docs", url));

            let info = ServiceInfo {
                id: ExecutionId::new(),
                pid: child.id(),
                port,
                url,
                docs_url,
                artifact: artifact.to_path_buf(),
                log,
            };

            tracing::info!(id = %info.id, url = %info.url, "API is running");
            registry.register(info.clone(), child).await;

            Ok(LaunchStatus::Running { service: info })
        }
        Some(status) => {
            let output = read_to_string(&log).unwrap_or_default();
            tracing::warn!(?status, "API failed to start");
            Ok(LaunchStatus::FailedToStart { output })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing;
    use tempfile::TempDir;

    #[test]
    fn rewrites_uvicorn_port_and_keeps_host() {
        let code = "app = FastAPI()\nif __name__ == '__main__':\n    uvicorn.run(app, host='0.0.0.0', port=8000)\n";
        let updated = rewrite_port(code, 8123).unwrap();
        assert!(updated.contains("uvicorn.run(app, host=\"0.0.0.0\", port=8123)"));
    }

    #[test]
    fn rewrite_without_uvicorn_call_is_none() {
        assert!(rewrite_port("print('no server')", 8001).is_none());
    }

    #[test]
    fn finds_a_port_when_range_is_free() {
        // hold one port so the search must skip it
        let held = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let busy = held.local_addr().unwrap().port();
        let found = find_available_port(busy, busy.saturating_add(50));
        assert!(found.is_some());
        assert_ne!(found, Some(busy));
    }

    #[test]
    fn empty_range_has_no_port() {
        assert_eq!(find_available_port(8000, 8000), None);
    }

    #[tokio::test]
    async fn denied_api_is_rejected_without_writing() {
        let dir = TempDir::new().unwrap();
        let reply = "```python\nimport subprocess\nsubprocess.run(['ls'])\n```";
        let ctx = testing::context(&dir, reply);
        let registry = ServiceRegistry::new();

        let report = launch_api(&ctx, &registry, "list files").await.unwrap();
        match report.launch {
            LaunchStatus::Rejected { issues } => {
                assert_eq!(issues, vec!["disallowed module: subprocess".to_string()]);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(report.artifact.is_none());
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn crashing_api_reports_failed_start() {
        let dir = TempDir::new().unwrap();
        let reply = "```python\nimport sys\nprint('bad config', file=sys.stderr)\nsys.exit(1)\n```";
        let mut ctx = testing::context(&dir, reply);
        ctx.config.backend.startup_wait_secs = 1;
        let registry = ServiceRegistry::new();

        let report = launch_api(&ctx, &registry, "broken api").await.unwrap();
        match report.launch {
            LaunchStatus::FailedToStart { output } => assert!(output.contains("bad config")),
            other => panic!("expected failed start, got {:?}", other),
        }
        assert!(report.artifact.unwrap().exists());
    }

    #[tokio::test]
    async fn long_running_api_is_registered_and_stoppable() {
        let dir = TempDir::new().unwrap();
        let reply = "```python\nimport time\n# fastapi stand-in\nwhile True:\n    time.sleep(0.1)\n```";
        let mut ctx = testing::context(&dir, reply);
        ctx.config.backend.startup_wait_secs = 1;
        let registry = ServiceRegistry::new();

        let report = launch_api(&ctx, &registry, "sleeper").await.unwrap();
        let service = match report.launch {
            LaunchStatus::Running { service } => service,
            other => panic!("expected running service, got {:?}", other),
        };
        assert!(service.url.starts_with("http://localhost:"));
        assert_eq!(service.docs_url, Some(format!("{}/docs", service.url)));

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, service.id);

        assert!(registry.stop(&service.id).await.unwrap());
        assert!(!registry.stop(&service.id).await.unwrap());
        assert!(registry.list().await.is_empty());
    }
    fn sleeper_info(dir: &TempDir, pid: Option<u32>) -> ServiceInfo {
        ServiceInfo {
            id: ExecutionId::new(),
            pid,
            port: 0,
            url: "http://localhost:0".to_string(),
            docs_url: None,
            artifact: dir.path().join("sleeper.py"),
            log: dir.path().join("sleeper.log"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stop_all_reaps_every_service() {
        let dir = TempDir::new().unwrap();
        let registry = ServiceRegistry::new();
        let mut pids = Vec::new();

        for _ in 0..2 {
            let child = Command::new("python3")
                .args(["-c", "import time; time.sleep(30)"])
                .kill_on_drop(true)
                .spawn()
                .unwrap();
            let pid = child.id().unwrap();
            pids.push(pid);
            registry.register(sleeper_info(&dir, Some(pid)), child).await;
        }
        assert_eq!(registry.list().await.len(), 2);

        registry.stop_all().await;
        assert!(registry.list().await.is_empty());

        // reaped children leave no /proc entry behind (zombies would)
        for pid in pids {
            assert!(!Path::new(&format!("/proc/{}", pid)).exists());
        }
    }
}
