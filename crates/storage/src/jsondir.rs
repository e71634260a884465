//! Generic JSON-per-entity directory, shared by the wallet, session, and
//! provenance persistence (`wallets/`, `sessions/`, `provenance/`).

use crate::{encode_id, StorageError, StoreResult};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field read lazily to purge expired session documents.
const EXPIRES_FIELD: &str = "_expiresAt";

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One category directory of JSON documents keyed by entity id.
#[derive(Clone, Debug)]
pub struct JsonDir {
    base: PathBuf,
}

impl JsonDir {
    /// Create a handle; the directory is created on first write.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.base.join(format!("{}.json", encode_id(id)))
    }

    /// Read a document. Expired documents (`_expiresAt` in the past) are
    /// deleted on lookup and reported as absent.
    pub fn read(&self, id: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let value: Value = serde_json::from_str(&text).map_err(|source| StorageError::Corrupt {
            id: id.to_string(),
            source,
        })?;
        if let Some(expires) = value.get(EXPIRES_FIELD).and_then(Value::as_u64) {
            if expires < now_millis() {
                let _ = fs::remove_file(&path);
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    /// Write a document atomically (temp file + rename).
    pub fn write(&self, id: &str, value: &Value) -> StoreResult<()> {
        if !self.base.exists() {
            fs::create_dir_all(&self.base)?;
        }
        let path = self.path_for(id);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove a document; returns whether it existed.
    pub fn remove(&self, id: &str) -> StoreResult<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// All stored ids, ascending.
    pub fn list(&self) -> StoreResult<Vec<String>> {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_read_write_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonDir::new(dir.path().join("wallets"));
        let doc = json!({"did": "did:web:a", "balances": {"SAT": 10000}});
        store.write("did:web:a", &doc).unwrap();
        assert_eq!(store.read("did:web:a").unwrap(), Some(doc));
    }

    #[test]
    fn test_expired_document_purged_on_read() {
        let dir = TempDir::new().unwrap();
        let store = JsonDir::new(dir.path().join("sessions"));
        store
            .write("tok-1", &json!({"did": "did:web:a", "_expiresAt": 1u64}))
            .unwrap();
        assert_eq!(store.read("tok-1").unwrap(), None);
        // Purge is physical, not just filtered.
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_unexpired_document_survives() {
        let dir = TempDir::new().unwrap();
        let store = JsonDir::new(dir.path().join("sessions"));
        let far_future = 4_102_444_800_000u64;
        store
            .write("tok-2", &json!({"did": "did:web:a", "_expiresAt": far_future}))
            .unwrap();
        assert!(store.read("tok-2").unwrap().is_some());
    }
}
