//! Before/after directory listings used to discover output files.

use std::{collections::BTreeSet, ffi::OsString, fs, path::Path};

use tracing::debug;

use crate::error::Result;

/// Prefix of the temporary script files written into the working directory.
/// Entries with it are never outputs, including other requests' scripts.
pub const SCRIPT_PREFIX: &str = ".snippet-";

/// Names of the immediate entries of a directory at one point in time.
pub type FileSnapshot = BTreeSet<OsString>;

pub fn snapshot(dir: &Path) -> Result<FileSnapshot> {
    let mut names = FileSnapshot::new();
    for entry in fs::read_dir(dir)? {
        names.insert(entry?.file_name());
    }
    Ok(names)
}

/// Computes new entries while ignoring package-manager bookkeeping.
#[derive(Debug, Clone)]
pub struct OutputDiffer {
    excluded: Vec<OsString>,
}

impl OutputDiffer {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self { excluded: excluded.into_iter().map(Into::into).collect() }
    }

    /// `after − before − excluded − script`, sorted.
    pub fn diff(&self, dir: &Path, before: &FileSnapshot, script: Option<&Path>) -> Result<Vec<String>> {
        let script_name = script.and_then(Path::file_name);
        let after = snapshot(dir)?;
        let new: Vec<String> = after
            .difference(before)
            .filter(|name| !self.excluded.contains(*name))
            .filter(|name| Some(name.as_os_str()) != script_name)
            .filter(|name| !name.to_string_lossy().starts_with(SCRIPT_PREFIX))
            .map(|name| name.to_string_lossy().into_owned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        debug!(dir = %dir.display(), count = new.len(), "new files");
        Ok(new)
    }
}
