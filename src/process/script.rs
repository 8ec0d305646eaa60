//! Running a script file through the package manager's runtime.

use std::{ffi::OsStr, path::Path, time::Duration};

use tracing::{info, warn};

use super::{run_captured, ChildEnv, Tool};
use crate::error::{Result, RunnerError};

/// Decoded streams of a script that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes scripts with `<package-manager> run <script>`, so they see the
/// environment the installer populated.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    package_manager: Tool,
    env: ChildEnv,
    deadline: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(package_manager: Tool, env: ChildEnv, deadline: Option<Duration>) -> Self {
        Self { package_manager, env, deadline }
    }

    /// Run `script` with `dir` as working directory. A non-zero exit becomes
    /// `Execution(stderr)`.
    pub async fn run(&self, script: &Path, dir: &Path) -> Result<ScriptOutput> {
        info!(script = %script.display(), "executing script");
        let args = [OsStr::new("run"), script.as_os_str()];
        let out = run_captured(
            &self.package_manager,
            args,
            dir,
            Some(&self.env),
            self.deadline,
        )
        .await?;

        if !out.success() {
            warn!(exit_code = ?out.exit_code, "script failed");
            return Err(RunnerError::Execution(out.failure_message("script")));
        }
        Ok(ScriptOutput {
            stdout: out.stdout_text(),
            stderr: out.stderr_text(),
        })
    }
}
