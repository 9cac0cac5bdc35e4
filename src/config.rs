// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::engine::validate::RuleConfig;
use crate::engine::{DenyList, ExecutorSettings, Validator};

/// Root configuration loaded from `config.yaml`.
///
/// Every section is optional. A missing file means "all defaults",
/// and CLI flags override individual values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Interpreter used for generated Python
    #[serde(default)]
    pub runtime: Runtime,

    /// Snippet execution limits
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Deny-list rules
    #[serde(default)]
    pub validation: ValidationConfig,

    /// LLM backend
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Launching generated API services
    #[serde(default)]
    pub backend: BackendConfig,

    /// HTTP control panel
    #[serde(default)]
    pub server: ServerConfig,

    /// Rendering and artifact location
    #[serde(default)]
    pub output: OutputConfig,
}

/// Runtime binary configuration.
///
/// runtime:
///   python: python3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(default = "default_python")]
    pub python: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            python: default_python(),
        }
    }
}

fn default_python() -> String {
    "python3".to_string()
}

/// execution:
///   timeout_secs: 5
///   max_timeout_secs: 60         # ceiling for per-request overrides
///   scratch_dir: /tmp/devagent   # optional
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound for timeouts requested over HTTP
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    /// Directory for transient scripts. Defaults to the system temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default = "default_memory_sample_ms")]
    pub memory_sample_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            scratch_dir: None,
            memory_sample_ms: default_memory_sample_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_timeout_secs() -> u64 {
    60
}

fn default_memory_sample_ms() -> u64 {
    20
}

/// validation:
///   rules:            # replaces the built-in deny-list when present
///     - pattern: '\bsocket\b'
///       message: "disallowed module: socket"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub rules: Option<Vec<RuleConfig>>,
}

/// generator:
///   model: gemini-1.5-flash
///   api_key_env: GOOGLE_API_KEY
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// backend:
///   port_start: 8000
///   port_end: 9000
///   startup_wait_secs: 3
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_port_start")]
    pub port_start: u16,

    /// Exclusive upper bound
    #[serde(default = "default_port_end")]
    pub port_end: u16,

    #[serde(default = "default_startup_wait_secs")]
    pub startup_wait_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            port_start: default_port_start(),
            port_end: default_port_end(),
            startup_wait_secs: default_startup_wait_secs(),
        }
    }
}

fn default_port_start() -> u16 {
    8000
}

fn default_port_end() -> u16 {
    9000
}

fn default_startup_wait_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_mode")]
    pub mode: OutputMode,

    /// Where generated pages and API sources are written
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: default_output_mode(),
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Stdout,
    Pretty,
    Simple,
}

fn default_output_mode() -> OutputMode {
    OutputMode::Simple
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

impl Config {
    /// Load and parse `config.yaml` from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let cfg: Config = serde_yaml::from_str(&raw).context("Failed to parse YAML config")?;
        cfg.check()?;

        Ok(cfg)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }

    /// Structural checks serde cannot express.
    pub fn check(&self) -> Result<()> {
        if self.runtime.python.trim().is_empty() {
            bail!("runtime.python must not be empty");
        }
        if self.execution.timeout_secs == 0 {
            bail!("execution.timeout_secs must be greater than zero");
        }
        if self.execution.max_timeout_secs < self.execution.timeout_secs {
            bail!(
                "execution.max_timeout_secs ({}) must not be below execution.timeout_secs ({})",
                self.execution.max_timeout_secs,
                self.execution.timeout_secs
            );
        }
        if self.backend.port_start >= self.backend.port_end {
            bail!(
                "backend.port_start ({}) must be below backend.port_end ({})",
                self.backend.port_start,
                self.backend.port_end
            );
        }
        Ok(())
    }

    pub fn deny_list(&self) -> Result<DenyList> {
        match &self.validation.rules {
            Some(rules) => DenyList::from_config(rules),
            None => DenyList::defaults(),
        }
    }

    pub fn validator(&self) -> Result<Validator> {
        let deny_list = self.deny_list()?;
        if deny_list.is_empty() {
            tracing::warn!("deny-list is empty; every snippet will pass validation");
        } else {
            tracing::debug!(rules = deny_list.len(), "deny-list loaded");
        }
        Ok(Validator::new(deny_list))
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            interpreter: self.runtime.python.clone(),
            timeout: Duration::from_secs(self.execution.timeout_secs),
            scratch_dir: self.execution.scratch_dir.clone(),
            memory_sample: Duration::from_millis(self.execution.memory_sample_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(yaml.as_bytes()).unwrap();
        temp.flush().unwrap();
        temp
    }

    #[test]
    fn empty_file_gives_defaults() {
        let temp = write_config("{}\n");
        let cfg = Config::load(temp.path()).unwrap();

        assert_eq!(cfg.runtime.python, "python3");
        assert_eq!(cfg.execution.timeout_secs, 5);
        assert_eq!(cfg.execution.max_timeout_secs, 60);
        assert_eq!(cfg.backend.port_start, 8000);
        assert_eq!(cfg.backend.port_end, 9000);
        assert_eq!(cfg.output.mode, OutputMode::Simple);
        assert!(cfg.validation.rules.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(cfg.server.addr, "127.0.0.1:8080");
    }

    #[test]
    fn sections_override_defaults() {
        let temp = write_config(
            r#"
runtime:
  python: /usr/bin/python3
execution:
  timeout_secs: 2
validation:
  rules:
    - pattern: '\bsocket\b'
      message: "disallowed module: socket"
output:
  mode: pretty
"#,
        );
        let cfg = Config::load(temp.path()).unwrap();

        assert_eq!(cfg.runtime.python, "/usr/bin/python3");
        assert_eq!(cfg.output.mode, OutputMode::Pretty);

        let settings = cfg.executor_settings();
        assert_eq!(settings.timeout, Duration::from_secs(2));
        assert_eq!(settings.interpreter, "/usr/bin/python3");

        let validator = cfg.validator().unwrap();
        assert!(!validator.validate("import socket").valid);
        assert!(validator.validate("import os; os.system('ls')").valid);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = write_config("execution:\n  timeout_secs: 0\n");
        let err = Config::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn max_timeout_below_default_is_rejected() {
        let temp = write_config("execution:\n  timeout_secs: 10\n  max_timeout_secs: 5\n");
        let err = Config::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains("max_timeout_secs"));
    }

    #[test]
    fn inverted_port_range_is_rejected() {
        let temp = write_config("backend:\n  port_start: 9000\n  port_end: 8000\n");
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn bad_rule_pattern_surfaces_on_build() {
        let temp = write_config(
            "validation:\n  rules:\n    - pattern: '(oops'\n      message: broken\n",
        );
        let cfg = Config::load(temp.path()).unwrap();
        assert!(cfg.validator().is_err());
    }
}
