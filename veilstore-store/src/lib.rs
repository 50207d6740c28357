//! Private share store
//!
//! A capacity-bounded, name-keyed collection of erasure-coded shares held
//! by one peer. Shares are kept in a stable lexicographic order by name:
//! a share's position in that order is the index a private lookup selects
//! by, so the order must not drift between listing and querying. The
//! [`pir`] module answers lookups against an immutable snapshot of that
//! order without ever learning which entry was selected.

pub mod pir;

pub use pir::StoreSnapshot;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;
use veilstore_core::VeilstoreError;

/// Longest accepted share name
pub const MAX_NAME_LEN: usize = 256;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised at the store boundary
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Share name already stored: {0}")]
    DuplicateName(String),

    #[error("Store capacity reached: {capacity}")]
    CapacityReached { capacity: usize },

    #[error("Uploads are disabled on this store")]
    UploadDisabled,

    #[error("Share name too long: {len} chars (max: {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("Wrong share size: expected {expected}, got {actual}")]
    WrongShareSize { expected: usize, actual: usize },

    #[error("Selector vector size mismatch: expected {expected}, got {actual}")]
    VectorSizeMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Crypto(#[from] VeilstoreError),
}

/// One share held by the store
#[derive(Debug, Clone)]
pub struct StoredShare {
    /// Unique name, by convention `"<file>_part<index>"`
    pub name: String,
    /// Raw share bytes, exactly `block_size` long
    pub data: Bytes,
}

/// Store configuration
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Maximum number of shares held
    pub capacity: usize,
    /// Size of every stored share in bytes
    pub block_size: usize,
    /// Private-lookup sub-chunk size; must divide `block_size`
    pub sub_chunk_size: usize,
    /// Whether uploads are accepted initially
    pub uploads_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            block_size: veilstore_core::DEFAULT_BLOCK_SIZE,
            sub_chunk_size: veilstore_core::DEFAULT_SUB_CHUNK_SIZE,
            uploads_enabled: true,
        }
    }
}

struct StoreInner {
    /// Sorted by name; position defines the lookup index
    entries: Vec<StoredShare>,
    capacity: usize,
    uploads_enabled: bool,
}

/// Capacity-bounded share store with a stable total order.
///
/// The capacity/enabled check and the insertion happen under one lock, so
/// two concurrent uploads cannot both pass a check only one can satisfy.
pub struct PrivateStore {
    block_size: usize,
    sub_chunk_size: usize,
    inner: Mutex<StoreInner>,
}

impl PrivateStore {
    /// Create a store from configuration
    pub fn new(config: StoreConfig) -> Result<Self> {
        if config.block_size == 0 || config.sub_chunk_size == 0 {
            return Err(StoreError::Configuration(
                "block_size and sub_chunk_size must be > 0".to_string(),
            ));
        }
        if config.block_size % config.sub_chunk_size != 0 {
            return Err(StoreError::Configuration(format!(
                "sub_chunk_size ({}) must divide block_size ({})",
                config.sub_chunk_size, config.block_size
            )));
        }
        Ok(Self {
            block_size: config.block_size,
            sub_chunk_size: config.sub_chunk_size,
            inner: Mutex::new(StoreInner {
                entries: Vec::new(),
                capacity: config.capacity,
                uploads_enabled: config.uploads_enabled,
            }),
        })
    }

    /// Size of every stored share
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Insert a share, keeping the name order stable.
    ///
    /// Check-and-insert is one critical section: rejects on a duplicate
    /// name, a full store, disabled uploads, an over-long name, or a
    /// payload that is not exactly one block.
    pub fn add(&self, name: impl Into<String>, data: Bytes) -> Result<()> {
        let name = name.into();
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }
        if data.len() != self.block_size {
            return Err(StoreError::WrongShareSize {
                expected: self.block_size,
                actual: data.len(),
            });
        }

        let mut inner = self.inner.lock();
        if !inner.uploads_enabled {
            return Err(StoreError::UploadDisabled);
        }
        if inner.entries.len() >= inner.capacity {
            return Err(StoreError::CapacityReached {
                capacity: inner.capacity,
            });
        }
        let position = match inner.entries.binary_search_by(|e| e.name.as_str().cmp(&name)) {
            Ok(_) => return Err(StoreError::DuplicateName(name)),
            Err(position) => position,
        };
        debug!(name = %name, position, "storing share");
        inner.entries.insert(position, StoredShare { name, data });
        Ok(())
    }

    /// The stored names in their stable order
    pub fn list_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Whether a name is stored
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .lock()
            .entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .is_ok()
    }

    /// Number of stored shares
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Whether an upload would currently be approved.
    ///
    /// Advisory only; `add` re-checks atomically.
    pub fn accepting(&self) -> bool {
        let inner = self.inner.lock();
        inner.uploads_enabled && inner.entries.len() < inner.capacity
    }

    /// Stop approving uploads
    pub fn disable_uploads(&self) {
        self.inner.lock().uploads_enabled = false;
    }

    /// Resume approving uploads
    pub fn enable_uploads(&self) {
        self.inner.lock().uploads_enabled = true;
    }

    /// Grow (never shrink below the current count) the capacity.
    ///
    /// Returns `false` and leaves the capacity unchanged when the new
    /// value is below the number of shares already held.
    pub fn set_capacity(&self, capacity: usize) -> bool {
        let mut inner = self.inner.lock();
        if capacity < inner.entries.len() {
            return false;
        }
        inner.capacity = capacity;
        true
    }

    /// An immutable view pairing the name list with the share bytes.
    ///
    /// A lookup round must list and query against the same ordering and
    /// count; taking one snapshot for both makes drift impossible even
    /// while uploads land concurrently.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.lock();
        StoreSnapshot::new(
            inner.entries.iter().map(|e| e.name.clone()).collect(),
            inner.entries.iter().map(|e| e.data.clone()).collect(),
            self.block_size,
            self.sub_chunk_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> PrivateStore {
        PrivateStore::new(StoreConfig {
            capacity: 3,
            block_size: 32,
            sub_chunk_size: 16,
            uploads_enabled: true,
        })
        .unwrap()
    }

    fn block(fill: u8) -> Bytes {
        Bytes::from(vec![fill; 32])
    }

    #[test]
    fn test_add_keeps_sorted_order() {
        let store = small_store();
        store.add("report_part2", block(2)).unwrap();
        store.add("archive_part0", block(0)).unwrap();
        store.add("report_part1", block(1)).unwrap();

        assert_eq!(
            store.list_names(),
            vec!["archive_part0", "report_part1", "report_part2"]
        );
        assert!(store.contains("report_part1"));
        assert!(!store.contains("report_part9"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let store = small_store();
        store.add("doc_part0", block(1)).unwrap();
        let err = store.add("doc_part0", block(2)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_enforced() {
        let store = small_store();
        for i in 0..3 {
            store.add(format!("f_part{i}"), block(i)).unwrap();
        }
        assert!(!store.accepting());

        let err = store.add("f_part3", block(3)).unwrap_err();
        assert!(matches!(err, StoreError::CapacityReached { .. }));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_upload_toggle() {
        let store = small_store();
        store.disable_uploads();
        assert!(!store.accepting());
        assert!(matches!(
            store.add("f_part0", block(0)),
            Err(StoreError::UploadDisabled)
        ));

        store.enable_uploads();
        assert!(store.accepting());
        store.add("f_part0", block(0)).unwrap();
    }

    #[test]
    fn test_set_capacity_never_shrinks_below_count() {
        let store = small_store();
        store.add("a_part0", block(0)).unwrap();
        store.add("b_part0", block(1)).unwrap();

        assert!(!store.set_capacity(1));
        assert!(store.set_capacity(10));
        assert!(store.accepting());
    }

    #[test]
    fn test_name_and_size_validation() {
        let store = small_store();
        let long_name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            store.add(long_name, block(0)),
            Err(StoreError::NameTooLong { .. })
        ));
        assert!(matches!(
            store.add("f_part0", Bytes::from_static(b"short")),
            Err(StoreError::WrongShareSize { .. })
        ));
    }

    #[test]
    fn test_snapshot_isolated_from_later_mutation() {
        let store = small_store();
        store.add("a_part0", block(0)).unwrap();

        let snapshot = store.snapshot();
        store.add("b_part0", block(1)).unwrap();

        // The snapshot still reflects the single-entry state
        assert_eq!(snapshot.share_count(), 1);
        assert_eq!(snapshot.names(), ["a_part0"]);
        assert_eq!(store.len(), 2);
    }
}
