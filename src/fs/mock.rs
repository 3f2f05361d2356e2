// src/fs/mock.rs

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use super::FileSystem;

#[derive(Debug, Clone)]
enum MockEntry {
    File(Vec<u8>),
    Dir(BTreeSet<String>), // child names
}

type Tree = HashMap<PathBuf, MockEntry>;

/// In-memory filesystem for tests.
///
/// Clones share the same tree, so a test can keep a handle and inspect what
/// the code under test wrote.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<Tree>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file, along with its parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        insert_file(&mut self.lock(), path.as_ref(), content.into());
    }

    /// All file paths currently stored, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self
            .lock()
            .iter()
            .filter(|(_, e)| matches!(e, MockEntry::File(_)))
            .map(|(p, _)| p.clone())
            .collect();
        out.sort();
        out
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        // A poisoned lock only means another test thread panicked.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn insert_file(entries: &mut Tree, path: &Path, content: Vec<u8>) {
    if let Some(parent) = path.parent() {
        ensure_dir(entries, parent);
        link_child(entries, parent, path);
    }
    entries.insert(path.to_path_buf(), MockEntry::File(content));
}

fn ensure_dir(entries: &mut Tree, path: &Path) {
    if path.as_os_str().is_empty() || entries.contains_key(path) {
        return;
    }
    entries.insert(path.to_path_buf(), MockEntry::Dir(BTreeSet::new()));
    if let Some(parent) = path.parent() {
        ensure_dir(entries, parent);
        link_child(entries, parent, path);
    }
}

fn link_child(entries: &mut Tree, parent: &Path, child: &Path) {
    if let (Some(MockEntry::Dir(children)), Some(name)) = (
        entries.get_mut(parent),
        child.file_name().and_then(|n| n.to_str()),
    ) {
        children.insert(name.to_string());
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lock().get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut entries = self.lock();
        if let Some(MockEntry::Dir(_)) = entries.get(path) {
            return Err(anyhow!("Is a directory: {:?}", path));
        }
        insert_file(&mut entries, path, contents.to_vec());
        Ok(())
    }

    fn write_new(&self, path: &Path, contents: &[u8]) -> Result<bool> {
        let mut entries = self.lock();
        if entries.contains_key(path) {
            return Ok(false);
        }
        insert_file(&mut entries, path, contents.to_vec());
        Ok(true)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut entries = self.lock();
        if let Some(MockEntry::File(_)) = entries.get(path) {
            return Err(anyhow!("Is a file: {:?}", path));
        }
        ensure_dir(&mut entries, path);
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File(_)))
    }

    fn file_names(&self, dir: &Path) -> Result<Vec<String>> {
        let entries = self.lock();
        match entries.get(dir) {
            // BTreeSet iteration is already sorted.
            Some(MockEntry::Dir(children)) => Ok(children
                .iter()
                .filter(|name| matches!(entries.get(&dir.join(name)), Some(MockEntry::File(_))))
                .cloned()
                .collect()),
            Some(MockEntry::File(_)) => Err(anyhow!("Not a directory: {:?}", dir)),
            None => Ok(Vec::new()),
        }
    }
}
