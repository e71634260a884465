//! Storage backends for the resource graph and the persisted-state layout.

pub mod file;
pub mod jsondir;
pub mod memory;

pub use file::FileStore;
pub use jsondir::JsonDir;
pub use memory::MemoryStore;

use hyprcat_linkdata::Node;
use std::path::Path;
use std::sync::Arc;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted document failed to parse.
    #[error("corrupt document for {id}: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Store result type.
pub type StoreResult<T> = Result<T, StorageError>;

/// The resource store interface every backend provides.
///
/// `put` is atomic from the caller's viewpoint: readers see either the old
/// or the new value, never a partial one.
pub trait ResourceStore: Send + Sync {
    /// Fetch a resource by id.
    fn get(&self, id: &str) -> StoreResult<Option<Node>>;
    /// Create or overwrite a resource.
    fn put(&self, id: &str, node: Node) -> StoreResult<()>;
    /// Remove a resource; returns whether it existed.
    fn delete(&self, id: &str) -> StoreResult<bool>;
    /// All stored ids, ascending.
    fn list(&self) -> StoreResult<Vec<String>>;
    /// Linear scan for resources declaring `ty` anywhere in their type set.
    fn find_by_type(&self, ty: &str) -> StoreResult<Vec<Node>>;
}

/// Backend selection, parsed from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Memory,
    File,
}

impl Backend {
    /// Parse the configuration spelling; unknown values fall back to memory.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "file" => Self::File,
            _ => Self::Memory,
        }
    }
}

/// Open the configured backend. File stores live under `dir/resources/`.
pub fn open_backend(backend: Backend, dir: &Path) -> Arc<dyn ResourceStore> {
    match backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::File => Arc::new(FileStore::new(dir.join("resources"))),
    }
}

/// Encode a resource id into a filesystem-safe filename.
///
/// URL-encodes the id and replaces `%` with `_` so names survive every
/// filesystem in play.
pub fn encode_id(id: &str) -> String {
    urlencoding::encode(id).replace('%', "_")
}
