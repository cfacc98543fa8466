//! Named-slot blob storage backing the alarm store.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::StorageError;

/// Text blobs addressed by slot name.
///
/// Writes replace the whole slot; there is no partial-write recovery
/// beyond what the implementation gives for free.
pub trait BlobStore: Send {
    /// Read a slot, `None` if it was never written.
    fn read(&self, slot: &str) -> Result<Option<String>, StorageError>;

    fn write(&mut self, slot: &str, contents: &str) -> Result<(), StorageError>;
}

/// One `<slot>.json` file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, slot: &str, contents: &str) -> Result<(), StorageError> {
        // Rename over the old file so a reader never sees half a write.
        let path = self.path_for(slot);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, contents)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }
}

/// In-process blob store. Clones share the same slots, which lets a test
/// keep a handle and inspect what the alarm store persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: &str) -> Option<String> {
        self.slots.lock().get(slot).cloned()
    }

    pub fn put(&self, slot: &str, contents: impl Into<String>) {
        self.slots.lock().insert(slot.to_string(), contents.into());
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(slot))
    }

    fn write(&mut self, slot: &str, contents: &str) -> Result<(), StorageError> {
        self.put(slot, contents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_missing_slot_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();

        assert_eq!(store.read("alarms").unwrap(), None);
    }

    #[test]
    fn file_store_overwrites_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileBlobStore::open(dir.path()).unwrap();

        store.write("alarms", "[1]").unwrap();
        store.write("alarms", "[2]").unwrap();

        assert_eq!(store.read("alarms").unwrap().as_deref(), Some("[2]"));
        assert!(!store.path_for("alarms").with_extension("json.tmp").exists());
    }

    #[test]
    fn file_store_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");

        let mut store = FileBlobStore::open(&nested).unwrap();
        store.write("alarms", "[]").unwrap();

        assert!(nested.join("alarms.json").exists());
    }

    #[test]
    fn memory_store_clones_share_slots() {
        let store = MemoryBlobStore::new();
        let mut writer = store.clone();

        writer.write("alarms", "[]").unwrap();

        assert_eq!(store.get("alarms").as_deref(), Some("[]"));
    }
}
