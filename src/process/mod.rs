//! Child process spawning with captured output and an optional deadline.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{process::Command, time::sleep};
use tracing::{debug, warn};

use crate::error::{Result, RunnerError};

pub mod script;

pub use script::{ProcessRunner, ScriptOutput};

/// Raw result of a finished child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stderr of a failed process, or `"<what> failed (exit N)"` when it
    /// printed nothing.
    pub fn failure_message(&self, what: &str) -> String {
        let stderr = self.stderr_text();
        if !stderr.trim().is_empty() {
            return stderr;
        }
        match self.exit_code {
            Some(code) => format!("{what} failed (exit {code})"),
            None => format!("{what} failed (killed by signal)"),
        }
    }
}

/// An external executable plus leading arguments, e.g. `python -m uv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub program: String,
    pub args: Vec<String>,
}

impl Tool {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn with_args<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }
}

/// Environment handed to every child: the package manager's cache location.
#[derive(Debug, Clone)]
pub struct ChildEnv {
    pub cache_var: String,
    pub cache_dir: PathBuf,
}

/// Spawn `tool args..` in `dir`, wait for it to exit and collect both
/// streams. Nothing is inherited from the parent's stdio. The child leads its
/// own process group; when `deadline` elapses the whole group is killed, so
/// scripts started by the package manager die with it, and `Timeout` is
/// returned.
pub async fn run_captured<I, S>(
    tool: &Tool,
    args: I,
    dir: &Path,
    env: Option<&ChildEnv>,
    deadline: Option<Duration>,
) -> Result<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(&tool.program);
    cmd.args(&tool.args)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(env) = env {
        cmd.env(&env.cache_var, &env.cache_dir);
    }
    debug!(?cmd, "spawning");

    let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
        program: tool.program.clone(),
        source,
    })?;

    let pid = child.id();
    let wait = child.wait_with_output();
    tokio::pin!(wait);

    let out = match deadline {
        Some(d) => tokio::select! {
            out = &mut wait => out?,
            _ = sleep(d) => {
                // The child is not reaped until `wait` drops, so its pid
                // still names the group here.
                if let Err(e) = kill_process_group(pid) {
                    warn!(error = %e, "failed to kill process group");
                }
                return Err(RunnerError::Timeout(d));
            }
        },
        None => wait.await?,
    };

    Ok(ProcessOutput {
        exit_code: out.status.code(),
        stdout: out.stdout,
        stderr: out.stderr,
    })
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) -> std::io::Result<()> {
    let Some(pid) = pid else {
        return Ok(());
    };
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = run_captured(
            &Tool::new("sh"),
            ["-c", "echo out; echo err >&2; exit 3"],
            dir.path(),
            None,
            None,
        )
        .await?;
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout_text(), "out\n");
        assert_eq!(out.stderr_text(), "err\n");
        Ok(())
    }

    #[tokio::test]
    async fn runs_in_requested_directory_with_cache_env() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let env = ChildEnv {
            cache_var: "RUNNER_TEST_CACHE".into(),
            cache_dir: dir.path().join(".cache"),
        };
        let out = run_captured(
            &Tool::new("sh"),
            ["-c", "pwd; echo $RUNNER_TEST_CACHE"],
            dir.path(),
            Some(&env),
            None,
        )
        .await?;
        let text = out.stdout_text();
        let mut lines = text.lines();
        let pwd = PathBuf::from(lines.next().unwrap_or_default());
        assert_eq!(pwd.canonicalize()?, dir.path().canonicalize()?);
        let expected = env.cache_dir.to_string_lossy().into_owned();
        assert_eq!(lines.next(), Some(expected.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = run_captured(&Tool::new("sh"), ["-c", "printf 'a\\377b'"], dir.path(), None, None).await?;
        assert!(out.success());
        assert_eq!(out.stdout_text(), "a\u{FFFD}b");
        Ok(())
    }

    #[tokio::test]
    async fn deadline_kills_the_child() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = run_captured(
            &Tool::new("sh"),
            ["-c", "sleep 30"],
            dir.path(),
            None,
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout(_)));
        Ok(())
    }

    #[tokio::test]
    async fn deadline_kills_grandchildren_too() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // The trailing `true` keeps the outer shell from exec'ing the inner one.
        let err = run_captured(
            &Tool::new("sh"),
            ["-c", "sh -c 'sleep 1; touch late.txt'; true"],
            dir.path(),
            None,
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("late.txt").exists());
        Ok(())
    }

    #[test]
    fn failure_message_falls_back_to_exit_code() {
        let mut out = ProcessOutput { exit_code: Some(2), stdout: Vec::new(), stderr: b" \n".to_vec() };
        assert_eq!(out.failure_message("install"), "install failed (exit 2)");
        out.exit_code = None;
        assert_eq!(out.failure_message("install"), "install failed (killed by signal)");
        out.stderr = b"boom\n".to_vec();
        assert_eq!(out.failure_message("install"), "boom\n");
    }

    #[tokio::test]
    async fn leading_tool_args_come_first() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let tool = Tool::with_args("sh", ["-c", "echo \"$0 $1\""]);
        let out = run_captured(&tool, ["first", "second"], dir.path(), None, None).await?;
        assert_eq!(out.stdout_text(), "first second\n");
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = run_captured(&Tool::new("definitely-not-a-real-program"), ["x"], dir.path(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
        Ok(())
    }
}
