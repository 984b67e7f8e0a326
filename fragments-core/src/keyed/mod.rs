/*!
Two-level keyed stores.

A keyed store addresses each value by a primary key (the owner) and a
secondary key (the item id). It has no knowledge of fragments; the storage
façade in [`crate::storage`] layers fragment operations over two of them,
one for metadata records and one for payload bytes.
*/

pub mod local;
pub mod memory;

pub use local::{FileDb, StoredValue};
pub use memory::MemoryDb;

use crate::{FragmentsError, Result};

/// Persistence primitive addressed by `(primary, secondary)` string keys.
///
/// Implementations must behave identically: reads of a missing key return
/// `Ok(None)`, deleting a missing key fails with
/// [`FragmentsError::NotFound`], `query` returns values in insertion order
/// (overwriting a key keeps its original position), and any empty key fails
/// with [`FragmentsError::InvalidKey`].
pub trait KeyedStore<V>: Send + Sync {
    /// Store `value` under the compound key, replacing any previous value.
    fn put(&self, primary: &str, secondary: &str, value: V) -> Result<()>;

    /// Fetch the value under the compound key, or `None` if absent.
    fn get(&self, primary: &str, secondary: &str) -> Result<Option<V>>;

    /// All values stored under `primary`, in insertion order.
    fn query(&self, primary: &str) -> Result<Vec<V>>;

    /// Remove the value under the compound key.
    fn del(&self, primary: &str, secondary: &str) -> Result<()>;
}

pub(crate) fn check_key(name: &str, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(FragmentsError::invalid_key(format!(
            "{name} key must be a non-empty string"
        )));
    }
    Ok(())
}

pub(crate) fn check_keys(primary: &str, secondary: &str) -> Result<()> {
    check_key("primary", primary)?;
    check_key("secondary", secondary)
}
