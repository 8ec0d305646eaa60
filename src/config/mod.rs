use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

use crate::process::Tool;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .runnerrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Build a config from defaults plus explicit pairs, ignoring the rc file
    /// and the environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Self { inner: map, config_path: default_config_path() }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).filter(|v| !v.is_empty()).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn working_dir(&self) -> PathBuf {
        let p = self
            .get_path("RUNNER_WORKING_DIR")
            .unwrap_or_else(|| env::temp_dir().join("python_outputs"));
        if p.is_absolute() {
            p
        } else {
            env::current_dir().map(|cwd| cwd.join(&p)).unwrap_or(p)
        }
    }

    /// `RUNNER_PACKAGE_MANAGER` plus whitespace-separated
    /// `RUNNER_PACKAGE_MANAGER_ARGS`.
    pub fn package_manager(&self) -> Tool {
        let program = self.get("RUNNER_PACKAGE_MANAGER").unwrap_or_else(|| "uv".to_string());
        let args = self.get("RUNNER_PACKAGE_MANAGER_ARGS").unwrap_or_default();
        Tool::with_args(program, args.split_whitespace())
    }

    /// `None` when the deadline is disabled with `0`.
    pub fn exec_timeout(&self) -> Option<Duration> {
        secs_or_none(self.get_u64("RUNNER_EXEC_TIMEOUT").unwrap_or(300))
    }

    pub fn install_timeout(&self) -> Option<Duration> {
        secs_or_none(self.get_u64("RUNNER_INSTALL_TIMEOUT").unwrap_or(600))
    }

    pub fn settings(&self) -> RunnerSettings {
        let defaults = RunnerSettings::new(self.working_dir());
        RunnerSettings {
            external_dir: self.get("RUNNER_EXTERNAL_DIR"),
            package_manager: self.package_manager(),
            cache_env: self.get("RUNNER_CACHE_ENV").unwrap_or(defaults.cache_env),
            cache_subdir: self.get("RUNNER_CACHE_SUBDIR").unwrap_or(defaults.cache_subdir),
            lock_file: self.get("RUNNER_LOCK_FILE").unwrap_or(defaults.lock_file),
            script_suffix: self.get("RUNNER_SCRIPT_SUFFIX").unwrap_or(defaults.script_suffix),
            exec_timeout: self.exec_timeout(),
            install_timeout: self.install_timeout(),
            ..defaults
        }
    }
}

/// Typed view of the configuration consumed by the engine.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub working_dir: PathBuf,
    /// User-visible location of `working_dir` (bind-mount host path).
    pub external_dir: Option<String>,
    pub package_manager: Tool,
    pub cache_env: String,
    pub cache_subdir: String,
    pub lock_file: String,
    pub venv_dir: String,
    pub script_suffix: String,
    pub exec_timeout: Option<Duration>,
    pub install_timeout: Option<Duration>,
}

impl RunnerSettings {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            external_dir: None,
            package_manager: Tool::new("uv"),
            cache_env: "UV_CACHE_DIR".into(),
            cache_subdir: ".cache".into(),
            lock_file: "uv.lock".into(),
            venv_dir: ".venv".into(),
            script_suffix: ".py".into(),
            exec_timeout: Some(Duration::from_secs(300)),
            install_timeout: Some(Duration::from_secs(600)),
        }
    }
}

fn secs_or_none(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &["RUST_LOG"];
    KEYS.contains(&k) || k.starts_with("RUNNER_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("snippet_runner").join(".runnerrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    // Paths
    m.insert(
        "RUNNER_WORKING_DIR".into(),
        env::temp_dir().join("python_outputs").to_string_lossy().into_owned(),
    );
    m.insert("RUNNER_CACHE_SUBDIR".into(), ".cache".into());
    m.insert("RUNNER_LOCK_FILE".into(), "uv.lock".into());

    // Tools
    m.insert("RUNNER_PACKAGE_MANAGER".into(), "uv".into());
    m.insert("RUNNER_CACHE_ENV".into(), "UV_CACHE_DIR".into());
    m.insert("RUNNER_SCRIPT_SUFFIX".into(), ".py".into());

    // Numbers (seconds)
    m.insert("RUNNER_EXEC_TIMEOUT".into(), "300".into());
    m.insert("RUNNER_INSTALL_TIMEOUT".into(), "600".into());

    m
}
