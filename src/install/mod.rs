//! Dependency installation memoised per working directory.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    error::{Result, RunnerError},
    process::{run_captured, ChildEnv, Tool},
};

type TokenSet = BTreeSet<String>;

/// Requirement tokens already installed, keyed by directory. Each directory
/// has its own async lock, held across the installer call.
#[derive(Debug, Default)]
pub struct InstalledSet {
    dirs: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<TokenSet>>>>,
}

impl InstalledSet {
    fn slot(&self, dir: &Path) -> Arc<tokio::sync::Mutex<TokenSet>> {
        let mut dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.entry(dir.to_path_buf()).or_default().clone()
    }

    pub async fn get(&self, dir: &Path) -> TokenSet {
        self.slot(dir).lock().await.clone()
    }
}

/// Split a whitespace-separated requirement string into tokens, keeping the
/// first occurrence of duplicates.
pub fn parse_requirements(requirements: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    requirements
        .split_whitespace()
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub struct DependencyInstaller {
    package_manager: Tool,
    env: ChildEnv,
    deadline: Option<Duration>,
    installed: InstalledSet,
}

impl DependencyInstaller {
    pub fn new(package_manager: Tool, env: ChildEnv, deadline: Option<Duration>) -> Self {
        Self {
            package_manager,
            env,
            deadline,
            installed: InstalledSet::default(),
        }
    }

    pub fn installed(&self) -> &InstalledSet {
        &self.installed
    }

    /// Install the tokens of `requirements` not yet installed in `dir`.
    /// Returns the tokens that were actually handed to the package manager.
    /// The memo is only updated after the installer exits successfully.
    pub async fn ensure_installed(&self, dir: &Path, requirements: &[String]) -> Result<Vec<String>> {
        if requirements.is_empty() {
            return Ok(Vec::new());
        }
        let slot = self.installed.slot(dir);
        let mut installed = slot.lock().await;

        let missing: Vec<String> = requirements
            .iter()
            .filter(|t| !installed.contains(*t))
            .cloned()
            .collect();
        if missing.is_empty() {
            debug!(dir = %dir.display(), "requirements already installed");
            return Ok(missing);
        }

        info!(dir = %dir.display(), packages = ?missing, "installing requirements");
        let args = std::iter::once("add").chain(missing.iter().map(String::as_str));
        let out = run_captured(&self.package_manager, args, dir, Some(&self.env), self.deadline).await?;
        if !out.success() {
            warn!(exit_code = ?out.exit_code, "install failed");
            return Err(RunnerError::Install(out.failure_message("install")));
        }

        installed.extend(missing.iter().cloned());
        Ok(missing)
    }
}
