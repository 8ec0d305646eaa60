//! Path-confined file access inside the working directory.
//!
//! Both readers go through [`SafeFileAccess::resolve_and_confine`]: a path that
//! resolves outside the root, lexically or through a symlink, is refused.

use std::{
    fs,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::{Result, RunnerError};

pub const DEFAULT_MAX_SIZE_KB: u64 = 1024;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "html", "css", "json", "xml", "md", "txt", "sh", "c", "cpp", "java", "rb",
];

const HEX_PREVIEW_CHARS: usize = 1024;

/// Raw image bytes plus the MIME type derived from the file extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePayload {
    #[serde(serialize_with = "as_base64")]
    pub data: Vec<u8>,
    pub mime_type: String,
}

fn as_base64<T: AsRef<[u8]>, S: Serializer>(data: &T, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&STANDARD.encode(data.as_ref()))
}

/// Case-insensitive check against [`IMAGE_EXTENSIONS`].
pub fn is_image(path: &Path) -> bool {
    lower_extension(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn lower_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Debug, Clone)]
pub struct SafeFileAccess {
    root: PathBuf,
}

impl SafeFileAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `requested` (relative to the root, or absolute) to a canonical
    /// path that lies inside the root.
    pub fn resolve_and_confine(&self, requested: &str) -> Result<PathBuf> {
        let lexical = normalize_path(&self.root.join(requested));
        let root_lexical = normalize_path(&self.root);
        let root_canonical = self.root.canonicalize().ok();

        let inside = lexical.starts_with(&root_lexical)
            || root_canonical.as_ref().is_some_and(|r| lexical.starts_with(r));
        if !inside {
            warn!(path = requested, "path escapes working directory");
            return Err(RunnerError::AccessDenied(requested.to_string()));
        }

        let canonical = match lexical.canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RunnerError::NotFound(requested.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        // Symlinks inside the root may still point elsewhere.
        let root_canonical = match root_canonical {
            Some(r) => r,
            None => return Err(RunnerError::NotFound(requested.to_string())),
        };
        if !canonical.starts_with(&root_canonical) {
            warn!(path = requested, target = %canonical.display(), "symlink escapes working directory");
            return Err(RunnerError::AccessDenied(requested.to_string()));
        }
        Ok(canonical)
    }

    /// Read a file as text. Source files are wrapped in a fenced block tagged
    /// with their extension; undecodable content falls back to a hex preview.
    pub fn read_text(&self, requested: &str, max_size_kb: u64) -> Result<String> {
        let path = self.resolve_and_confine(requested)?;
        let meta = fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(RunnerError::NotFound(requested.to_string()));
        }

        let size_kb = meta.len() as f64 / 1024.0;
        if size_kb > max_size_kb as f64 {
            return Err(RunnerError::TooLarge { size_kb, max_kb: max_size_kb });
        }

        let bytes = fs::read(&path)?;
        debug!(path = %path.display(), len = bytes.len(), "read file");
        match String::from_utf8(bytes) {
            Ok(content) => {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                    Ok(format!("File: {requested}\n\n```{ext}\n{content}\n```"))
                } else {
                    Ok(format!("File: {requested}\n\n{content}"))
                }
            }
            Err(e) => {
                let bytes = e.into_bytes();
                let mut hex = hex::encode(&bytes);
                hex.truncate(HEX_PREVIEW_CHARS);
                Ok(format!(
                    "Binary file: {requested}\nFile size: {} bytes\nHex representation (first {HEX_PREVIEW_CHARS} chars):\n{hex}",
                    bytes.len()
                ))
            }
        }
    }

    pub fn read_image(&self, requested: &str) -> Result<ImagePayload> {
        let path = self.resolve_and_confine(requested)?;
        if !path.is_file() {
            return Err(RunnerError::NotFound(requested.to_string()));
        }
        let data = fs::read(&path)?;
        let mime_type = match lower_extension(&path).as_deref() {
            Some("jpg") | Some("jpeg") => "image/jpeg".to_string(),
            Some(ext) => format!("image/{ext}"),
            None => "application/octet-stream".to_string(),
        };
        Ok(ImagePayload { data, mime_type })
    }
}

/// Resolve `.` and `..` without touching the filesystem. `..` never climbs
/// above the root component.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                Some(Component::ParentDir) | None => components.push(component),
                Some(_) => {
                    components.pop();
                }
            },
            _ => components.push(component),
        }
    }
    components.iter().map(|c| c.as_os_str()).collect()
}
