//! Local filesystem adapter using std::fs.

use std::io;
use std::path::Path;

use kiln_core::{
    application::{ApplicationError, ports::Filesystem},
    error::{KilnError, KilnResult},
};

/// Production filesystem implementation using `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn create_dir_all(&self, path: &Path) -> KilnResult<()> {
        std::fs::create_dir_all(path).map_err(|e| map_io_error(path, e, "create directory"))
    }

    fn write_file(&self, path: &Path, content: &str) -> KilnResult<()> {
        std::fs::write(path, content).map_err(|e| map_io_error(path, e, "write file"))
    }

    fn read_to_string(&self, path: &Path) -> KilnResult<String> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ApplicationError::FileNotFound {
                path: path.display().to_string(),
            }
            .into(),
            _ => map_io_error(path, e, "read file"),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

fn map_io_error(path: &Path, e: io::Error, operation: &str) -> KilnError {
    ApplicationError::FilesystemError {
        path: path.to_path_buf(),
        reason: format!("Failed to {}: {}", operation, e),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let nested = dir.path().join("a/b");
        fs.create_dir_all(&nested).unwrap();
        fs.write_file(&nested.join("c.txt"), "hi").unwrap();

        assert!(fs.exists(&nested.join("c.txt")));
        assert!(!fs.exists(&nested), "directories are not files");
        assert_eq!(fs.read_to_string(&nested.join("c.txt")).unwrap(), "hi");
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let dir = TempDir::new().unwrap();
        let err = LocalFilesystem
            .read_to_string(&dir.path().join("nope"))
            .unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }
}
