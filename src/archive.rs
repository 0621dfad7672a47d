//! In-memory archive tree
//!
//! [`ArchiveTree`] is an ordered map from `/`-separated paths to entries.
//! Entries loaded from an existing zip are kept as [`RawEntry`] markers that
//! point back into the source buffer; on serialization they are copied in
//! their compressed form, so untouched entries come out byte-identical with
//! their original metadata (including Unix permission bits).

use crate::error::{PackError, PackResult};
use crate::progress::MonotonicProgress;
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Default mode for regular files
const FILE_MODE: u32 = 0o644;

/// Mode for directories and executables
const EXEC_MODE: u32 = 0o755;

/// Per-entry progress stays below this until the archive is finalized
const ENTRY_PROGRESS_CEILING: f64 = 0.99;

/// Entry copied verbatim from a source archive
#[derive(Clone)]
pub struct RawEntry {
    source: Arc<Vec<u8>>,
    index: usize,
    size: u64,
    is_dir: bool,
    unix_mode: Option<u32>,
}

impl RawEntry {
    /// Uncompressed size
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Unix mode recorded in the source archive
    pub fn unix_mode(&self) -> Option<u32> {
        self.unix_mode
    }

    fn read(&self) -> PackResult<Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(self.source.as_slice()))?;
        let mut file = archive.by_index(self.index)?;
        let mut buffer = Vec::with_capacity(self.size as usize);
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl fmt::Debug for RawEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawEntry")
            .field("index", &self.index)
            .field("size", &self.size)
            .field("is_dir", &self.is_dir)
            .field("unix_mode", &self.unix_mode)
            .finish()
    }
}

/// Content of one tree entry
#[derive(Debug, Clone)]
pub enum Entry {
    /// Owned bytes with an optional Unix mode
    File { data: Vec<u8>, unix_mode: Option<u32> },
    /// Explicit directory entry
    Directory,
    /// Copied byte-identically from a source archive
    Raw(RawEntry),
}

impl Entry {
    /// Regular file
    pub fn file(data: impl Into<Vec<u8>>) -> Self {
        Entry::File {
            data: data.into(),
            unix_mode: None,
        }
    }

    /// File with the executable bits set
    pub fn executable(data: impl Into<Vec<u8>>) -> Self {
        Entry::File {
            data: data.into(),
            unix_mode: Some(EXEC_MODE),
        }
    }

    /// Uncompressed size
    pub fn size(&self) -> u64 {
        match self {
            Entry::File { data, .. } => data.len() as u64,
            Entry::Directory => 0,
            Entry::Raw(raw) => raw.size,
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            Entry::Directory => true,
            Entry::Raw(raw) => raw.is_dir,
            Entry::File { .. } => false,
        }
    }

    /// Unix mode the entry will carry
    pub fn unix_mode(&self) -> Option<u32> {
        match self {
            Entry::File { unix_mode, .. } => *unix_mode,
            Entry::Directory => Some(EXEC_MODE),
            Entry::Raw(raw) => raw.unix_mode,
        }
    }
}

/// Compression used for owned entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveCompression {
    Stored,
    #[default]
    Deflated,
}

impl From<ArchiveCompression> for CompressionMethod {
    fn from(value: ArchiveCompression) -> Self {
        match value {
            ArchiveCompression::Stored => CompressionMethod::Stored,
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// Serialization options
#[derive(Debug, Clone, Copy)]
pub struct SerializeOptions {
    /// Compression for owned entries (raw entries keep their own)
    pub compression: ArchiveCompression,
    /// Record Unix permission bits so executables stay runnable
    pub unix_permissions: bool,
    /// Stamp owned entries with a fixed 1980-01-01 timestamp
    pub reproducible: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            compression: ArchiveCompression::Deflated,
            unix_permissions: true,
            reproducible: true,
        }
    }
}

/// Ordered tree of archive entries
#[derive(Debug, Clone, Default)]
pub struct ArchiveTree {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

impl ArchiveTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a zip archive
    ///
    /// Every entry becomes a [`RawEntry`] sharing `bytes`; nothing is
    /// decompressed here.
    pub fn load_from(bytes: Vec<u8>) -> PackResult<Self> {
        let source = Arc::new(bytes);
        let mut archive = ZipArchive::new(Cursor::new(source.as_slice()))?;
        let mut tree = Self::new();

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            let raw = RawEntry {
                source: source.clone(),
                index,
                size: file.size(),
                is_dir: file.is_dir(),
                unix_mode: file.unix_mode(),
            };
            let name = file.name().to_string();
            tree.put(name, Entry::Raw(raw));
        }

        tracing::debug!(
            target: "stagepack::archive",
            "Loaded archive: {} entries, {} bytes",
            tree.len(),
            source.len()
        );
        Ok(tree)
    }

    /// Add every file under `root`, paths relative to `root`
    pub fn add_dir(&mut self, root: &Path) -> PackResult<usize> {
        if !root.is_dir() {
            return Err(PackError::Config(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let mut added = 0;
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored(e))
        {
            let entry = entry.map_err(|e| PackError::Io(std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| PackError::Config(e.to_string()))?;
            let data = std::fs::read(entry.path())?;
            self.put(
                relative.to_string_lossy(),
                Entry::File {
                    data,
                    unix_mode: file_mode(entry.path()),
                },
            );
            added += 1;
        }

        tracing::debug!(
            target: "stagepack::archive",
            "Added {} files from {}",
            added,
            root.display()
        );
        Ok(added)
    }

    /// Paths in insertion order
    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.order
            .iter()
            .filter_map(|p| self.entries.get(p).map(|e| (p.as_str(), e)))
    }

    /// Consume the tree, yielding entries in insertion order
    pub fn into_entries(self) -> impl Iterator<Item = (String, Entry)> {
        let mut entries = self.entries;
        self.order
            .into_iter()
            .filter_map(move |p| entries.remove(&p).map(|e| (p, e)))
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(&normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize_path(path))
    }

    /// Insert an entry, replacing any entry at the same path in place
    pub fn put(&mut self, path: impl AsRef<str>, entry: Entry) {
        let path = normalize_path(path.as_ref());
        if self.entries.insert(path.clone(), entry).is_none() {
            self.order.push(path);
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        let path = normalize_path(path);
        let removed = self.entries.remove(&path)?;
        self.order.retain(|p| *p != path);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Decompressed content of a file entry
    pub fn read(&self, path: &str) -> PackResult<Option<Vec<u8>>> {
        match self.get(path) {
            None => Ok(None),
            Some(Entry::File { data, .. }) => Ok(Some(data.clone())),
            Some(Entry::Directory) => Ok(Some(Vec::new())),
            Some(Entry::Raw(raw)) => raw.read().map(Some),
        }
    }

    /// Rename every entry, keeping order
    ///
    /// When two paths map to the same name the later entry wins.
    pub fn rename_all(self, mut rename: impl FnMut(&str) -> String) -> Self {
        let mut tree = Self::new();
        for (path, entry) in self.into_entries() {
            tree.put(rename(&path), entry);
        }
        tree
    }

    /// Move every entry under `prefix`
    pub fn prefixed(self, prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        self.rename_all(|path| format!("{}/{}", prefix, path))
    }

    /// Total uncompressed size
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(Entry::size).sum()
    }

    /// Write the tree as a zip archive
    ///
    /// `on_progress` receives non-decreasing fractions, the last call being
    /// exactly `1.0` once the archive is complete.
    pub fn serialize(
        &self,
        options: &SerializeOptions,
        mut on_progress: impl FnMut(f64),
    ) -> PackResult<Vec<u8>> {
        let mut tracker = MonotonicProgress::new();
        let mut report = |value: f64| {
            if let Some(v) = tracker.advance(value) {
                on_progress(v);
            }
        };
        report(0.0);

        let total_weight: u64 = self.iter().map(|(_, e)| e.size().max(1)).sum();
        let mut done_weight = 0u64;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut sources: HashMap<*const Vec<u8>, ZipArchive<Cursor<&[u8]>>> = HashMap::new();

        for (path, entry) in self.iter() {
            match entry {
                Entry::Raw(raw) => {
                    let key = Arc::as_ptr(&raw.source);
                    if !sources.contains_key(&key) {
                        let archive = ZipArchive::new(Cursor::new(raw.source.as_slice()))?;
                        sources.insert(key, archive);
                    }
                    if let Some(archive) = sources.get_mut(&key) {
                        let file = archive.by_index_raw(raw.index)?;
                        writer.raw_copy_file_rename(file, path)?;
                    }
                }
                Entry::Directory => {
                    writer.add_directory(path, self.file_options(options, EXEC_MODE, 0))?;
                }
                Entry::File { data, unix_mode } => {
                    let mode = unix_mode.unwrap_or(FILE_MODE);
                    writer.start_file(path, self.file_options(options, mode, data.len()))?;
                    writer.write_all(data)?;
                }
            }

            done_weight += entry.size().max(1);
            report((done_weight as f64 / total_weight as f64).min(ENTRY_PROGRESS_CEILING));
        }

        let bytes = writer.finish()?.into_inner();
        report(1.0);

        tracing::debug!(
            target: "stagepack::archive",
            "Serialized {} entries into {} bytes",
            self.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    fn file_options(&self, options: &SerializeOptions, mode: u32, len: usize) -> SimpleFileOptions {
        let mut file_options = SimpleFileOptions::default()
            .compression_method(options.compression.into())
            .large_file(len as u64 >= u32::MAX as u64);
        if options.unix_permissions {
            file_options = file_options.unix_permissions(mode);
        }
        if options.reproducible {
            file_options = file_options.last_modified_time(zip::DateTime::default());
        }
        file_options
    }
}

/// Normalize separators to `/` and drop leading `./` or `/`
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized.trim_start_matches('/').to_string()
}

fn is_ignored(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    matches!(name.as_ref(), ".git" | ".DS_Store" | "Thumbs.db")
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}
