//! The three task modes of the panel.
//!
//! Each task asks the generator for code, extracts the fenced block and
//! then renders, persists or runs it. They share one `TaskContext`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{Executor, Validator};
use crate::generator::CodeGenerator;
use crate::util::{artifact_name, write_atomically};

pub mod backend;
pub mod dsa;
pub mod frontend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Frontend,
    Backend,
    Dsa,
}

impl TaskKind {
    /// Fence language the reply is expected to use.
    pub fn code_language(self) -> &'static str {
        match self {
            TaskKind::Frontend => "html",
            TaskKind::Backend | TaskKind::Dsa => "python",
        }
    }
}

pub struct TaskContext {
    pub config: Config,
    pub validator: Validator,
    pub executor: Executor,
    pub generator: Arc<dyn CodeGenerator>,
}

impl TaskContext {
    pub fn new(config: Config, generator: Arc<dyn CodeGenerator>) -> Result<Self> {
        let validator = config.validator()?;
        let executor = Executor::new(config.executor_settings());

        Ok(Self {
            config,
            validator,
            executor,
            generator,
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.output.dir.clone()
    }

    /// Persist a generated Python file. The source is validated again
    /// before anything reaches disk.
    pub fn write_python(&self, prefix: &str, description: &str, code: &str) -> Result<PathBuf> {
        let validation = self.validator.validate(code);
        if !validation.is_valid() {
            bail!(
                "Refusing to write unsafe code: {}",
                validation.issues.join("; ")
            );
        }

        let name = artifact_name(prefix, description, "py");
        write_atomically(&self.output_dir(), &name, code)
    }
}

pub(crate) fn require_description(description: &str, what: &str) -> Result<()> {
    if description.trim().is_empty() {
        bail!("Please provide {}.", what);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::generator::StaticReply;
    use tempfile::TempDir;

    /// Context writing artifacts and transient scripts under `dir`.
    pub fn context(dir: &TempDir, reply: &str) -> TaskContext {
        let mut config = Config::default();
        config.output.dir = dir.path().join("generated");
        config.execution.scratch_dir = Some(dir.path().to_path_buf());
        TaskContext::new(config, Arc::new(StaticReply::new(reply))).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn code_languages() {
        assert_eq!(TaskKind::Frontend.code_language(), "html");
        assert_eq!(TaskKind::Backend.code_language(), "python");
        assert_eq!(TaskKind::Dsa.code_language(), "python");
    }

    #[test]
    fn write_python_refuses_denied_code() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::context(&dir, "");

        let err = ctx
            .write_python("generated_api", "x", "import os\nos.system('ls')\n")
            .unwrap_err();
        assert!(err.to_string().contains("disallowed call: os.system"));
        assert!(!ctx.output_dir().exists());
    }

    #[test]
    fn write_python_persists_clean_code() {
        let dir = TempDir::new().unwrap();
        let ctx = testing::context(&dir, "");

        let path = ctx
            .write_python("generated_api", "todo api", "print('ok')\n")
            .unwrap();
        assert!(path.starts_with(ctx.output_dir()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "print('ok')\n");
    }

    #[test]
    fn blank_description_is_rejected() {
        assert!(require_description("  ", "a website type").is_err());
        assert!(require_description("Blog", "a website type").is_ok());
    }
}
