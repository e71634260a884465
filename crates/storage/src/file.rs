//! File-backed resource store: one JSON document per resource.

use crate::{encode_id, ResourceStore, StorageError, StoreResult};
use hyprcat_linkdata::Node;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// File store. Writes go to a temp file then rename, so readers see either
/// the old or the new document. The base directory is created lazily.
pub struct FileStore {
    base: PathBuf,
    // Serializes writers; readers go straight to the filesystem.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `base`. No I/O happens until first use.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn ensure_dir(&self) -> StoreResult<()> {
        if !self.base.exists() {
            fs::create_dir_all(&self.base)?;
            debug!(dir = %self.base.display(), "created store directory");
        }
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.base.join(format!("{}.json", encode_id(id)))
    }

    fn read_doc(&self, path: &Path, id: &str) -> StoreResult<Option<Node>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let value: Value = serde_json::from_str(&text).map_err(|source| StorageError::Corrupt {
            id: id.to_string(),
            source,
        })?;
        Ok(Some(Node::from_value(&value)))
    }
}

impl ResourceStore for FileStore {
    fn get(&self, id: &str) -> StoreResult<Option<Node>> {
        self.read_doc(&self.path_for(id), id)
    }

    fn put(&self, id: &str, node: Node) -> StoreResult<()> {
        self.ensure_dir()?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path_for(id);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(&node.to_value())?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".json") else { continue };
            let decoded = urlencoding::decode(&stem.replace('_', "%"))
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| stem.to_string());
            ids.push(decoded);
        }
        ids.sort();
        Ok(ids)
    }

    fn find_by_type(&self, ty: &str) -> StoreResult<Vec<Node>> {
        let mut found = Vec::new();
        for id in self.list()? {
            if let Some(node) = self.get(&id)? {
                if node.is_of_type(ty) {
                    found.push(node);
                }
            }
        }
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}
