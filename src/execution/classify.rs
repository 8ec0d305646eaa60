//! Decides the shape of an execution reply.

use std::path::PathBuf;

use serde::Serialize;

use crate::{
    error::Result,
    files::{is_image, ImagePayload, SafeFileAccess},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionReply {
    Text { text: String },
    TextWithFiles { text: String, files: Vec<PathBuf> },
    TextWithImage { text: String, image: ImagePayload },
}

impl ExecutionReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text } | Self::TextWithFiles { text, .. } | Self::TextWithImage { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputClassifier {
    external_dir: Option<String>,
}

impl OutputClassifier {
    /// `external_dir` replaces the output-files header with the path the
    /// end user sees (e.g. the host side of a bind mount).
    pub fn new(external_dir: Option<String>) -> Self {
        Self { external_dir }
    }

    pub fn classify(
        &self,
        stdout: &str,
        output_files: &[PathBuf],
        access: &SafeFileAccess,
    ) -> Result<ExecutionReply> {
        let text = stdout.trim().to_string();
        match output_files {
            [] => Ok(ExecutionReply::Text { text }),
            // A directory named like an image is listed, not loaded.
            [single] if single.is_file() && is_image(single) => {
                let image = access.read_image(&single.to_string_lossy())?;
                Ok(ExecutionReply::TextWithImage { text, image })
            }
            files => {
                let mut lines = Vec::with_capacity(files.len() + 2);
                if !text.is_empty() {
                    lines.push(text);
                }
                match &self.external_dir {
                    Some(external) => {
                        lines.push(format!("Files created at {external}:"));
                        lines.extend(files.iter().filter_map(|f| {
                            f.file_name().map(|n| n.to_string_lossy().into_owned())
                        }));
                    }
                    None => {
                        lines.push("Output Files:".to_string());
                        lines.extend(files.iter().map(|f| f.display().to_string()));
                    }
                }
                Ok(ExecutionReply::TextWithFiles {
                    text: lines.join("\n"),
                    files: files.to_vec(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> anyhow::Result<(tempfile::TempDir, SafeFileAccess)> {
        let tmp = tempfile::tempdir()?;
        let access = SafeFileAccess::new(tmp.path());
        Ok((tmp, access))
    }

    #[test]
    fn no_files_is_plain_text() -> anyhow::Result<()> {
        let (_tmp, access) = setup()?;
        let reply = OutputClassifier::default().classify("4\n", &[], &access)?;
        assert_eq!(reply, ExecutionReply::Text { text: "4".into() });
        Ok(())
    }

    #[test]
    fn single_image_is_loaded() -> anyhow::Result<()> {
        let (tmp, access) = setup()?;
        let path = tmp.path().join("plot_1_20240101.PNG");
        fs::write(&path, b"\x89PNG")?;
        let reply = OutputClassifier::default().classify(" saved \n", &[path], &access)?;
        match reply {
            ExecutionReply::TextWithImage { text, image } => {
                assert_eq!(text, "saved");
                assert_eq!(image.data, b"\x89PNG");
                assert_eq!(image.mime_type, "image/png");
            }
            other => panic!("expected image reply, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn directory_with_image_extension_is_listed() -> anyhow::Result<()> {
        let (tmp, access) = setup()?;
        let dir = tmp.path().join("figs.png");
        fs::create_dir(&dir)?;
        let reply = OutputClassifier::default().classify("ok\n", &[dir.clone()], &access)?;
        let expected = format!("ok\nOutput Files:\n{}", dir.display());
        assert_eq!(reply, ExecutionReply::TextWithFiles { text: expected, files: vec![dir] });
        Ok(())
    }

    #[test]
    fn two_images_are_a_file_list() -> anyhow::Result<()> {
        let (tmp, access) = setup()?;
        let files = vec![tmp.path().join("a.png"), tmp.path().join("b.jpg")];
        let reply = OutputClassifier::default().classify("done", &files, &access)?;
        let expected = format!(
            "done\nOutput Files:\n{}\n{}",
            files[0].display(),
            files[1].display()
        );
        assert_eq!(reply, ExecutionReply::TextWithFiles { text: expected, files });
        Ok(())
    }

    #[test]
    fn external_dir_rewrites_header() -> anyhow::Result<()> {
        let (tmp, access) = setup()?;
        let files = vec![tmp.path().join("out.csv")];
        let classifier = OutputClassifier::new(Some("/home/me/outputs".into()));
        let reply = classifier.classify("", &files, &access)?;
        assert_eq!(reply.text(), "Files created at /home/me/outputs:\nout.csv");
        Ok(())
    }
}
