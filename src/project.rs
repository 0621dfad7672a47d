//! Input projects

use crate::archive::{ArchiveTree, SerializeOptions};
use crate::error::{PackError, PackResult};
use std::path::Path;
use tracing::debug;

/// Entry naming the project inside an sb3
const PROJECT_JSON: &str = "project.json";

/// Zip local file header magic
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// How the project data is shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    /// Zip of `project.json` plus asset files
    Sb3,
    /// Opaque project data, shipped as-is
    Blob,
}

/// A project to package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub kind: ProjectKind,
    pub data: Vec<u8>,
}

impl Project {
    pub fn sb3(data: Vec<u8>) -> Self {
        Self {
            kind: ProjectKind::Sb3,
            data,
        }
    }

    pub fn blob(data: Vec<u8>) -> Self {
        Self {
            kind: ProjectKind::Blob,
            data,
        }
    }

    /// Detect the kind from the content
    ///
    /// Zip data containing a top-level `project.json` is an sb3, anything
    /// else is a blob.
    pub fn detect(data: Vec<u8>) -> Self {
        if data.starts_with(ZIP_MAGIC) && has_project_json(&data) {
            Self::sb3(data)
        } else {
            Self::blob(data)
        }
    }

    /// Read and detect a project file, or pack an unpacked project folder
    pub fn load(path: &Path) -> PackResult<Self> {
        if path.is_dir() {
            return Self::from_dir(path);
        }
        let data = std::fs::read(path).map_err(|e| {
            PackError::Config(format!("Failed to read project {}: {}", path.display(), e))
        })?;
        if data.is_empty() {
            return Err(PackError::Config(format!(
                "Project file is empty: {}",
                path.display()
            )));
        }
        Ok(Self::detect(data))
    }

    /// Zip an unpacked project folder into an sb3
    ///
    /// The folder must hold `project.json` at its root.
    pub fn from_dir(root: &Path) -> PackResult<Self> {
        if !root.join(PROJECT_JSON).is_file() {
            return Err(PackError::Config(format!(
                "No {} in project folder {}",
                PROJECT_JSON,
                root.display()
            )));
        }
        let mut tree = ArchiveTree::new();
        let files = tree.add_dir(root)?;
        let data = tree.serialize(&SerializeOptions::default(), |_| {})?;
        debug!(
            target: "stagepack::archive",
            files,
            bytes = data.len(),
            "Packed project folder {}",
            root.display()
        );
        Ok(Self::sb3(data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn has_project_json(data: &[u8]) -> bool {
    zip::ZipArchive::new(std::io::Cursor::new(data))
        .map(|archive| archive.index_for_name(PROJECT_JSON).is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(name: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"{}").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_detect_sb3() {
        assert_eq!(Project::detect(zip_with("project.json")).kind, ProjectKind::Sb3);
    }

    #[test]
    fn test_load_project_folder() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("project.json"), "{}").unwrap();
        std::fs::write(temp.path().join("0a1b.svg"), "<svg/>").unwrap();

        let project = Project::load(temp.path()).unwrap();
        assert_eq!(project.kind, ProjectKind::Sb3);

        let tree = ArchiveTree::load_from(project.data).unwrap();
        assert_eq!(tree.read("project.json").unwrap(), Some(b"{}".to_vec()));
        assert!(tree.contains("0a1b.svg"));
    }

    #[test]
    fn test_folder_without_project_json() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("readme.txt"), "hi").unwrap();
        assert!(matches!(
            Project::from_dir(temp.path()),
            Err(PackError::Config(_))
        ));
    }

    #[test]
    fn test_detect_blob() {
        assert_eq!(Project::detect(zip_with("other.json")).kind, ProjectKind::Blob);
        assert_eq!(Project::detect(b"raw".to_vec()).kind, ProjectKind::Blob);
    }
}
