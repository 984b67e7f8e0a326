/*!
Storage façade for fragment persistence.

This module defines the storage abstraction (port) the fragment entity talks
to, and the implementation that binds two [`KeyedStore`]s (metadata records
and payload bytes) into fragment-shaped operations. The backend is chosen
once from [`StorageConfig`] by [`create_storage_from_config`].
*/

use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};
use crate::keyed::{FileDb, KeyedStore, MemoryDb};
use crate::{Fragment, FragmentsError, Result};

/// Result of listing an owner's fragments.
///
/// Serializes as a bare JSON array of ids or of full records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FragmentListing {
    Ids(Vec<String>),
    Expanded(Vec<Fragment>),
}

impl FragmentListing {
    pub fn len(&self) -> usize {
        match self {
            FragmentListing::Ids(ids) => ids.len(),
            FragmentListing::Expanded(fragments) => fragments.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fragment ids, in listing order, whichever form was requested.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            FragmentListing::Ids(ids) => ids.iter().map(String::as_str).collect(),
            FragmentListing::Expanded(fragments) => fragments.iter().map(Fragment::id).collect(),
        }
    }
}

/// Storage abstraction for fragment metadata and payloads
///
/// This trait is the whole contract a backend must satisfy. Every
/// implementation must keep the same semantics:
/// - reads of a missing fragment return `Ok(None)`, never an error
/// - listings come back in insertion order
/// - deleting a fragment without metadata fails with `NotFound`
#[cfg_attr(test, mockall::automock)]
pub trait FragmentStorage: Send + Sync {
    /// Load the metadata record for `(owner_id, id)`
    fn read_fragment(&self, owner_id: &str, id: &str) -> Result<Option<Fragment>>;

    /// Persist a metadata record under its own `(owner_id, id)`
    fn write_fragment(&self, fragment: &Fragment) -> Result<()>;

    /// Load the payload bytes for `(owner_id, id)`
    fn read_fragment_data(&self, owner_id: &str, id: &str) -> Result<Option<Bytes>>;

    /// Persist payload bytes for `(owner_id, id)`
    fn write_fragment_data(&self, owner_id: &str, id: &str, data: Bytes) -> Result<()>;

    /// List an owner's fragments as ids, or as full records when `expand` is set
    fn list_fragments(&self, owner_id: &str, expand: bool) -> Result<FragmentListing>;

    /// Remove both metadata and payload for `(owner_id, id)`
    fn delete_fragment(&self, owner_id: &str, id: &str) -> Result<()>;

    /// Which backend this is, for logging
    fn backend(&self) -> StorageBackend;
}

/// Storage façade over a metadata store and a payload store.
#[derive(Debug)]
pub struct KeyedFragmentStorage<M, D> {
    metadata: M,
    data: D,
    backend: StorageBackend,
}

/// Façade over two process-local stores
pub type MemoryFragmentStorage = KeyedFragmentStorage<MemoryDb<Fragment>, MemoryDb<Bytes>>;

/// Façade over two directories on the local filesystem
pub type LocalFragmentStorage = KeyedFragmentStorage<FileDb<Fragment>, FileDb<Bytes>>;

impl MemoryFragmentStorage {
    pub fn in_memory() -> Self {
        Self {
            metadata: MemoryDb::new(),
            data: MemoryDb::new(),
            backend: StorageBackend::Memory,
        }
    }
}

impl LocalFragmentStorage {
    /// Metadata goes under `<base_dir>/metadata`, payloads under `<base_dir>/data`.
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            metadata: FileDb::with_base_dir(base_dir.join("metadata")),
            data: FileDb::with_base_dir(base_dir.join("data")),
            backend: StorageBackend::Local,
        }
    }
}

impl<M, D> KeyedFragmentStorage<M, D>
where
    M: KeyedStore<Fragment>,
    D: KeyedStore<Bytes>,
{
    /// Count the call and log failures.
    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        #[cfg(feature = "metrics")]
        {
            let metrics = crate::observability::FragmentsMetrics::global();
            metrics.record_storage_op(self.backend.as_str(), operation);
            if result.is_err() {
                metrics.record_storage_error(self.backend.as_str(), operation);
            }
        }
        if let Err(e) = &result {
            debug!(backend = %self.backend, operation, error = %e, "Storage operation failed");
        }
        result
    }
}

impl<M, D> FragmentStorage for KeyedFragmentStorage<M, D>
where
    M: KeyedStore<Fragment>,
    D: KeyedStore<Bytes>,
{
    fn read_fragment(&self, owner_id: &str, id: &str) -> Result<Option<Fragment>> {
        self.observe("read_fragment", self.metadata.get(owner_id, id))
    }

    fn write_fragment(&self, fragment: &Fragment) -> Result<()> {
        self.observe(
            "write_fragment",
            self.metadata
                .put(fragment.owner_id(), fragment.id(), fragment.clone()),
        )
    }

    fn read_fragment_data(&self, owner_id: &str, id: &str) -> Result<Option<Bytes>> {
        self.observe("read_fragment_data", self.data.get(owner_id, id))
    }

    fn write_fragment_data(&self, owner_id: &str, id: &str, data: Bytes) -> Result<()> {
        #[cfg(feature = "metrics")]
        crate::observability::FragmentsMetrics::global().record_payload_size(data.len());
        self.observe("write_fragment_data", self.data.put(owner_id, id, data))
    }

    fn list_fragments(&self, owner_id: &str, expand: bool) -> Result<FragmentListing> {
        let records = self.observe("list_fragments", self.metadata.query(owner_id))?;
        Ok(if expand {
            FragmentListing::Expanded(records)
        } else {
            FragmentListing::Ids(records.into_iter().map(|f| f.id().to_string()).collect())
        })
    }

    fn delete_fragment(&self, owner_id: &str, id: &str) -> Result<()> {
        let result = (|| {
            // Metadata is the existence signal
            if self.metadata.get(owner_id, id)?.is_none() {
                return Err(FragmentsError::not_found(format!(
                    "Fragment not found for id: {id}"
                )));
            }
            // Payload first, metadata last; a missing payload is tolerated
            match self.data.del(owner_id, id) {
                Ok(()) | Err(FragmentsError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            self.metadata.del(owner_id, id)
        })();
        self.observe("delete_fragment", result)
    }

    fn backend(&self) -> StorageBackend {
        self.backend
    }
}

/// Create the storage façade selected by `config`
///
/// # Example
/// ```rust
/// use fragments_core::{create_storage_from_config, StorageConfig};
///
/// let storage = create_storage_from_config(&StorageConfig::memory())?;
/// assert!(storage.list_fragments("user1", false)?.is_empty());
/// # Ok::<(), fragments_core::FragmentsError>(())
/// ```
pub fn create_storage_from_config(config: &StorageConfig) -> Result<Box<dyn FragmentStorage>> {
    config.validate()?;

    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory fragment storage");
            Ok(Box::new(MemoryFragmentStorage::in_memory()))
        }
        StorageBackend::Local => {
            let base_path = config.local_base_path.as_ref().ok_or_else(|| {
                FragmentsError::validation("Local backend requires a base directory")
            })?;
            info!(path = %base_path.display(), "Using local filesystem fragment storage");
            Ok(Box::new(LocalFragmentStorage::with_base_dir(base_path)))
        }
    }
}
