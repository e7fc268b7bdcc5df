//! Virtual file system: staged, in-memory writes over a real project root.
//!
//! Every blueprint action writes here first. Reads prefer staged content and
//! fall through to disk, so a module sees the files earlier modules flushed as
//! well as its own pending writes. Nothing reaches disk until
//! [`VirtualFileSystem::flush_to_disk`].
//!
//! ```text
//!   read_file ──► staged entry? ──yes──► content
//!                     │ no
//!                     ▼
//!                 on disk? ──yes──► content
//!                     │ no
//!                     ▼
//!               FILE_NOT_FOUND
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    application::{ApplicationError, ports::Filesystem},
    domain::{ModuleId, RelativePath},
    error::{KilnError, KilnResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Staged,
    Flushed,
}

/// Whether a write introduced a file or changed one that was already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsEntry {
    pub path: RelativePath,
    pub content: String,
    /// Module that last wrote this entry.
    pub origin: Option<ModuleId>,
    pub state: EntryState,
    existed_on_disk: bool,
}

impl VfsEntry {
    pub fn change_kind(&self) -> ChangeKind {
        if self.existed_on_disk {
            ChangeKind::Modified
        } else {
            ChangeKind::Created
        }
    }
}

/// Opaque copy of the staged state, used to roll back a failed blueprint.
#[derive(Debug, Clone)]
pub struct VfsSnapshot {
    entries: BTreeMap<RelativePath, VfsEntry>,
}

/// Result of a flush. One failing path never blocks the others.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Entries that reached disk and left staging, marked `Flushed`.
    pub written: Vec<VfsEntry>,
    pub failed: Vec<(RelativePath, KilnError)>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn written_paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.written.iter().map(|e| &e.path)
    }
}

pub struct VirtualFileSystem {
    root: PathBuf,
    fs: Arc<dyn Filesystem>,
    entries: BTreeMap<RelativePath, VfsEntry>,
    owner: Option<ModuleId>,
}

impl VirtualFileSystem {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            entries: BTreeMap::new(),
            owner: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Attribute subsequent writes to `module`.
    pub fn set_owner(&mut self, module: Option<ModuleId>) {
        self.owner = module;
    }

    fn absolute(&self, path: &RelativePath) -> PathBuf {
        self.root.join(path.as_path())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn read_file(&self, path: &RelativePath) -> KilnResult<String> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(entry.content.clone());
        }
        let absolute = self.absolute(path);
        if self.fs.exists(&absolute) {
            return self.fs.read_to_string(&absolute);
        }
        Err(ApplicationError::FileNotFound {
            path: path.to_string(),
        }
        .into())
    }

    pub fn exists(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path) || self.fs.exists(&self.absolute(path))
    }

    /// Like `read_file`, but `None` instead of `FILE_NOT_FOUND`.
    pub fn read_optional(&self, path: &RelativePath) -> KilnResult<Option<String>> {
        if self.exists(path) {
            self.read_file(path).map(Some)
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Create a new file. Fails if the path is staged or exists on disk.
    pub fn write_file(&mut self, path: &RelativePath, content: impl Into<String>) -> KilnResult<()> {
        if self.exists(path) {
            return Err(ApplicationError::FileAlreadyExists {
                path: path.to_string(),
            }
            .into());
        }
        self.stage(path, content.into());
        Ok(())
    }

    /// Stage content unconditionally, replacing whatever is there.
    pub fn put_file(&mut self, path: &RelativePath, content: impl Into<String>) {
        self.stage(path, content.into());
    }

    /// Append to a file, creating it when missing. No delimiter is inserted.
    pub fn append_file(&mut self, path: &RelativePath, content: &str) -> KilnResult<()> {
        let mut current = self.read_optional(path)?.unwrap_or_default();
        current.push_str(content);
        self.stage(path, current);
        Ok(())
    }

    /// Prepend to a file, creating it when missing. No delimiter is inserted.
    pub fn prepend_file(&mut self, path: &RelativePath, content: &str) -> KilnResult<()> {
        let current = self.read_optional(path)?.unwrap_or_default();
        self.stage(path, format!("{content}{current}"));
        Ok(())
    }

    fn stage(&mut self, path: &RelativePath, content: String) {
        let existed_on_disk = match self.entries.get(path) {
            Some(entry) => entry.existed_on_disk,
            None => self.fs.exists(&self.absolute(path)),
        };
        debug!(path = %path, bytes = content.len(), "Staged");
        self.entries.insert(
            path.clone(),
            VfsEntry {
                path: path.clone(),
                content,
                origin: self.owner.clone(),
                state: EntryState::Staged,
                existed_on_disk,
            },
        );
    }

    // ------------------------------------------------------------------------
    // Staging state
    // ------------------------------------------------------------------------

    /// Entries waiting to be flushed, in path order.
    pub fn staged(&self) -> impl Iterator<Item = &VfsEntry> {
        self.entries.values()
    }

    pub fn entry(&self, path: &RelativePath) -> Option<&VfsEntry> {
        self.entries.get(path)
    }

    pub fn has_staged(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn snapshot(&self) -> VfsSnapshot {
        VfsSnapshot {
            entries: self.entries.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: VfsSnapshot) {
        self.entries = snapshot.entries;
    }

    /// Drop every staged entry without writing it.
    pub fn discard(&mut self) {
        self.entries.clear();
    }

    /// Write every staged entry to disk exactly once.
    ///
    /// Written entries leave staging, so later reads of those paths go to
    /// disk. Entries that failed to write stay staged.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn flush_to_disk(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        for (path, mut entry) in std::mem::take(&mut self.entries) {
            let absolute = self.root.join(path.as_path());
            let result = absolute
                .parent()
                .map_or(Ok(()), |parent| self.fs.create_dir_all(parent))
                .and_then(|()| self.fs.write_file(&absolute, &entry.content));

            match result {
                Ok(()) => {
                    entry.state = EntryState::Flushed;
                    report.written.push(entry);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Flush failed");
                    report.failed.push((path.clone(), e));
                    self.entries.insert(path, entry);
                }
            }
        }

        debug!(
            written = report.written.len(),
            failed = report.failed.len(),
            "Flush finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::output::MockFilesystem;
    use crate::application::services::testing::FakeFilesystem;

    fn p(path: &str) -> RelativePath {
        RelativePath::try_new(path).unwrap()
    }

    fn vfs_with(fs: &Arc<FakeFilesystem>) -> VirtualFileSystem {
        VirtualFileSystem::new("/project", fs.clone())
    }

    #[test]
    fn staged_content_shadows_disk() {
        let fs = Arc::new(FakeFilesystem::with_file("/project/a.txt", "disk"));
        let mut vfs = vfs_with(&fs);

        assert_eq!(vfs.read_file(&p("a.txt")).unwrap(), "disk");
        vfs.put_file(&p("a.txt"), "staged");
        assert_eq!(vfs.read_file(&p("a.txt")).unwrap(), "staged");
        assert_eq!(fs.read("/project/a.txt").as_deref(), Some("disk"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let fs = Arc::new(FakeFilesystem::default());
        let vfs = vfs_with(&fs);
        let err = vfs.read_file(&p("nope.txt")).unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn write_file_refuses_existing_paths() {
        let fs = Arc::new(FakeFilesystem::with_file("/project/on-disk.txt", "x"));
        let mut vfs = vfs_with(&fs);

        vfs.write_file(&p("new.txt"), "1").unwrap();
        assert_eq!(
            vfs.write_file(&p("new.txt"), "2").unwrap_err().code(),
            "FILE_ALREADY_EXISTS"
        );
        assert_eq!(
            vfs.write_file(&p("on-disk.txt"), "2").unwrap_err().code(),
            "FILE_ALREADY_EXISTS"
        );
    }

    #[test]
    fn append_and_prepend_concatenate_without_delimiter() {
        let fs = Arc::new(FakeFilesystem::default());
        let mut vfs = vfs_with(&fs);

        vfs.write_file(&p("greeting.txt"), "hello").unwrap();
        vfs.append_file(&p("greeting.txt"), " world").unwrap();
        vfs.prepend_file(&p("greeting.txt"), ">> ").unwrap();
        assert_eq!(vfs.read_file(&p("greeting.txt")).unwrap(), ">> hello world");

        vfs.append_file(&p("fresh.txt"), "created").unwrap();
        assert_eq!(vfs.read_file(&p("fresh.txt")).unwrap(), "created");
    }

    #[test]
    fn flush_creates_parents_and_writes_once() {
        let fs = Arc::new(FakeFilesystem::default());
        let mut vfs = vfs_with(&fs);
        vfs.write_file(&p("nested/deep/file.txt"), "content").unwrap();

        let report = vfs.flush_to_disk();
        assert!(report.is_success());
        assert_eq!(report.written_paths().collect::<Vec<_>>(), [&p("nested/deep/file.txt")]);
        assert_eq!(report.written[0].state, EntryState::Flushed);
        assert!(fs.has_dir("/project/nested/deep"));
        assert_eq!(
            fs.read("/project/nested/deep/file.txt").as_deref(),
            Some("content")
        );

        let again = vfs.flush_to_disk();
        assert!(again.written.is_empty());
        assert!(!vfs.has_staged());
    }

    #[test]
    fn flushed_entries_leave_staging_and_read_from_disk() {
        let fs = Arc::new(FakeFilesystem::default());
        let mut vfs = vfs_with(&fs);
        vfs.write_file(&p("a.txt"), "one").unwrap();
        vfs.flush_to_disk();

        assert!(vfs.entry(&p("a.txt")).is_none());
        assert_eq!(vfs.staged().count(), 0);

        // Later reads see disk, not a stale in-memory copy.
        fs.write_file(Path::new("/project/a.txt"), "edited on disk").unwrap();
        assert_eq!(vfs.read_file(&p("a.txt")).unwrap(), "edited on disk");

        // A second write to the path counts as a modification.
        vfs.put_file(&p("a.txt"), "two");
        assert_eq!(vfs.entry(&p("a.txt")).unwrap().change_kind(), ChangeKind::Modified);
    }

    #[test]
    fn flush_failure_does_not_block_other_paths() {
        let mut fs = MockFilesystem::new();
        fs.expect_exists().returning(|_| false);
        fs.expect_create_dir_all().returning(|_| Ok(()));
        fs.expect_write_file().returning(|path, _| {
            if path.ends_with("bad.txt") {
                Err(ApplicationError::FilesystemError {
                    path: path.to_path_buf(),
                    reason: "read-only".into(),
                }
                .into())
            } else {
                Ok(())
            }
        });

        let mut vfs = VirtualFileSystem::new("/project", Arc::new(fs));
        vfs.write_file(&p("bad.txt"), "x").unwrap();
        vfs.write_file(&p("good.txt"), "y").unwrap();

        let report = vfs.flush_to_disk();
        assert_eq!(report.written_paths().collect::<Vec<_>>(), [&p("good.txt")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, p("bad.txt"));
        // The failed entry stays staged.
        assert!(vfs.has_staged());
    }

    #[test]
    fn snapshot_restore_discards_later_writes() {
        let fs = Arc::new(FakeFilesystem::default());
        let mut vfs = vfs_with(&fs);
        vfs.write_file(&p("keep.txt"), "a").unwrap();

        let snapshot = vfs.snapshot();
        vfs.write_file(&p("drop.txt"), "b").unwrap();
        vfs.append_file(&p("keep.txt"), "more").unwrap();
        vfs.restore(snapshot);

        assert!(!vfs.exists(&p("drop.txt")));
        assert_eq!(vfs.read_file(&p("keep.txt")).unwrap(), "a");
    }

    #[test]
    fn change_kind_tracks_disk_state() {
        let fs = Arc::new(FakeFilesystem::with_file("/project/package.json", "{}"));
        let mut vfs = vfs_with(&fs);
        vfs.set_owner(Some(ModuleId::parse("next").unwrap()));
        vfs.put_file(&p("package.json"), "{\"a\":1}");
        vfs.write_file(&p("new.ts"), "").unwrap();

        let pkg = vfs.entry(&p("package.json")).unwrap();
        assert_eq!(pkg.change_kind(), ChangeKind::Modified);
        assert_eq!(pkg.origin.as_ref().map(ModuleId::as_str), Some("next"));
        assert_eq!(
            vfs.entry(&p("new.ts")).unwrap().change_kind(),
            ChangeKind::Created
        );
    }
}
