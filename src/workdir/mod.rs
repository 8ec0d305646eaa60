//! The single working-directory root: creation, cache subdirectory and
//! one-time project initialisation.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    config::RunnerSettings,
    error::{Result, RunnerError},
    process::{run_captured, ChildEnv, Tool},
};

#[derive(Debug)]
pub struct WorkingDirectoryStore {
    root: PathBuf,
    cache_subdir: String,
    cache_env: String,
    package_manager: Tool,
    init_deadline: Option<Duration>,
    project: OnceCell<()>,
}

impl WorkingDirectoryStore {
    pub fn new(settings: &RunnerSettings) -> Self {
        Self {
            root: settings.working_dir.clone(),
            cache_subdir: settings.cache_subdir.clone(),
            cache_env: settings.cache_env.clone(),
            package_manager: settings.package_manager.clone(),
            init_deadline: settings.install_timeout,
            project: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.cache_subdir)
    }

    pub fn child_env(&self) -> ChildEnv {
        ChildEnv {
            cache_var: self.cache_env.clone(),
            cache_dir: self.cache_dir(),
        }
    }

    /// Create the root and its cache subdirectory if missing. Safe to call
    /// repeatedly and concurrently.
    pub fn resolve(&self) -> Result<PathBuf> {
        fs::create_dir_all(self.cache_dir())?;
        Ok(self.root.clone())
    }

    /// `resolve`, then run `<package-manager> init` once per process if the
    /// root has no `*.toml` manifest yet.
    pub async fn ensure_project(&self) -> Result<PathBuf> {
        let root = self.resolve()?;
        self.project
            .get_or_try_init(|| async {
                if has_manifest(&root)? {
                    debug!(dir = %root.display(), "project manifest present");
                    return Ok(());
                }
                info!(dir = %root.display(), "initializing project");
                let out = run_captured(
                    &self.package_manager,
                    ["init"],
                    &root,
                    Some(&self.child_env()),
                    self.init_deadline,
                )
                .await?;
                if !out.success() {
                    return Err(RunnerError::ProjectInit {
                        dir: root.clone(),
                        stderr: out.failure_message("init"),
                    });
                }
                Ok(())
            })
            .await?;
        Ok(root)
    }
}

fn has_manifest(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "toml") {
            return Ok(true);
        }
    }
    Ok(false)
}
