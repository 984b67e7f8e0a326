/*!
# Fragments Core

Owner-scoped storage of typed byte payloads ("fragments") with conversion
between representations on read.

This crate provides:

- A typed [`ContentType`] parsed at the boundary and a fixed set of supported types
- The [`Fragment`] entity, which keeps metadata and payload size in step
- A backend-agnostic storage façade over two keyed stores (metadata, payload)
- In-memory and local filesystem backends, chosen once from [`StorageConfig`]
- A conversion engine for Markdown, HTML, CSV, JSON, YAML and raster images

## Architecture

The fragment entity talks only to the [`FragmentStorage`] trait. Each
backend implements it by binding two [`keyed::KeyedStore`]s, so the
absent-vs-error and insertion-order guarantees are stated once and
shared. Conversion is a pure function with no storage access.

## Usage

```rust
use fragments_core::{create_storage_from_config, Fragment, StorageConfig};

let storage = create_storage_from_config(&StorageConfig::memory())?;

let mut fragment = Fragment::new("user1", "text/plain")?;
fragment.set_data(storage.as_ref(), "hello")?;
assert_eq!(fragment.size(), 5);

let stored = Fragment::by_id(storage.as_ref(), "user1", fragment.id())?;
assert_eq!(stored.get_data(storage.as_ref())?, "hello");
# Ok::<(), fragments_core::FragmentsError>(())
```
*/

pub mod config;
pub mod content_type;
pub mod convert;
pub mod error;
pub mod fragment;
pub mod keyed;
pub mod observability;
pub mod service;
pub mod storage;

#[cfg(test)]
mod error_tests;

pub use config::{StorageBackend, StorageConfig};
pub use content_type::{
    extension_for_mime, is_supported_type, mime_for_extension, parse_requested_identity,
    ContentType, RequestedIdentity, SUPPORTED_TYPES,
};
pub use convert::{can_convert, convert, targets_for, Conversion};
pub use error::{FragmentsError, Result};
pub use fragment::{Fragment, NewFragment};
pub use service::{FragmentService, RenderedFragment};
pub use storage::{
    create_storage_from_config, FragmentListing, FragmentStorage, KeyedFragmentStorage,
    LocalFragmentStorage, MemoryFragmentStorage,
};
