//! Execution engine: install requirements, run a snippet, collect new files.

use std::{io::Write, path::PathBuf};

use tracing::{info, instrument};

pub mod classify;
pub mod diff;
pub mod fence;

pub use classify::{ExecutionReply, OutputClassifier};
pub use diff::{snapshot, FileSnapshot, OutputDiffer, SCRIPT_PREFIX};
pub use fence::strip_fence;

use crate::{
    config::RunnerSettings,
    error::Result,
    files::{ImagePayload, SafeFileAccess},
    install::{parse_requirements, DependencyInstaller},
    process::ProcessRunner,
    workdir::WorkingDirectoryStore,
};

#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub code: String,
    pub requirements: Vec<String>,
}

impl ExecutionRequest {
    /// `requirements` is a whitespace-separated list of package names.
    pub fn new(code: impl Into<String>, requirements: &str) -> Self {
        Self {
            code: code.into(),
            requirements: parse_requirements(requirements),
        }
    }
}

/// Output of a successful run. Failed runs never produce one, so failed runs
/// never report files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub output_files: Vec<PathBuf>,
}

/// Service context shared by all requests. Owns the working directory and
/// the installed-requirements memo for the lifetime of the service.
#[derive(Debug)]
pub struct Engine {
    settings: RunnerSettings,
    store: WorkingDirectoryStore,
    installer: DependencyInstaller,
    runner: ProcessRunner,
    differ: OutputDiffer,
    classifier: OutputClassifier,
}

impl Engine {
    pub fn new(settings: RunnerSettings) -> Self {
        let store = WorkingDirectoryStore::new(&settings);
        let env = store.child_env();
        let installer =
            DependencyInstaller::new(settings.package_manager.clone(), env.clone(), settings.install_timeout);
        let runner = ProcessRunner::new(settings.package_manager.clone(), env, settings.exec_timeout);
        let differ = OutputDiffer::new([
            settings.lock_file.as_str(),
            settings.cache_subdir.as_str(),
            settings.venv_dir.as_str(),
        ]);
        let classifier = OutputClassifier::new(settings.external_dir.clone());
        Self { settings, store, installer, runner, differ, classifier }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn working_dir(&self) -> &WorkingDirectoryStore {
        &self.store
    }

    pub fn installer(&self) -> &DependencyInstaller {
        &self.installer
    }

    pub fn files(&self) -> SafeFileAccess {
        SafeFileAccess::new(self.store.root())
    }

    /// Run one request to completion. Install strictly precedes the run.
    #[instrument(skip_all, fields(requirements = request.requirements.len()))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput> {
        let root = self.store.ensure_project().await?;
        let code = strip_fence(&request.code);

        self.installer.ensure_installed(&root, &request.requirements).await?;

        let before = snapshot(&root)?;
        let mut script = tempfile::Builder::new()
            .prefix(SCRIPT_PREFIX)
            .suffix(&self.settings.script_suffix)
            .tempfile_in(&root)?;
        script.write_all(code.as_bytes())?;
        script.flush()?;

        let out = self.runner.run(script.path(), &root).await?;
        let names = self.differ.diff(&root, &before, Some(script.path()))?;
        drop(script);

        info!(files = names.len(), "execution finished");
        Ok(ExecutionOutput {
            stdout: out.stdout,
            stderr: out.stderr,
            output_files: names.iter().map(|n| root.join(n)).collect(),
        })
    }

    /// `execute` followed by classification of the outputs.
    pub async fn execute_code(&self, code: &str, requirements: &str) -> Result<ExecutionReply> {
        let out = self.execute(&ExecutionRequest::new(code, requirements)).await?;
        self.classifier.classify(&out.stdout, &out.output_files, &self.files())
    }

    pub fn read_file(&self, path: &str, max_size_kb: u64) -> Result<String> {
        self.store.resolve()?;
        self.files().read_text(path, max_size_kb)
    }

    pub fn read_image(&self, path: &str) -> Result<ImagePayload> {
        self.store.resolve()?;
        self.files().read_image(path)
    }
}
