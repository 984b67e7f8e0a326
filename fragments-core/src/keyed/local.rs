/*!
Local filesystem keyed store.
*/

use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use super::{check_key, check_keys, KeyedStore};
use crate::{FragmentsError, Result};

/// Name of the per-primary file listing secondary keys in insertion order.
const INDEX_FILE: &str = ".index";

/// Values a [`FileDb`] knows how to write to and read back from disk.
pub trait StoredValue: Sized {
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: Vec<u8>) -> Result<Self>;
}

impl StoredValue for Bytes {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.to_vec())
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        Ok(Bytes::from(bytes))
    }
}

/// Local filesystem [`KeyedStore`]
///
/// Each value is a file at `<base_dir>/<sha256(primary)>/<sha256(secondary)>`,
/// with digests written as hex. Any key, of any length, maps to a fixed
/// 64-character path component. Next to the values, an index file records
/// the original secondary keys in insertion order, which is the order
/// `query` returns.
///
/// All files are written to a temporary sibling first and then renamed into
/// place, so readers never observe a partially written value.
///
/// # Example
/// ```rust
/// use bytes::Bytes;
/// use fragments_core::keyed::{FileDb, KeyedStore};
///
/// # let dir = tempfile::TempDir::new().unwrap();
/// let db: FileDb<Bytes> = FileDb::with_base_dir(dir.path());
/// db.put("owner", "item", Bytes::from_static(b"hello"))?;
/// assert_eq!(db.get("owner", "item")?, Some(Bytes::from_static(b"hello")));
/// # Ok::<(), fragments_core::FragmentsError>(())
/// ```
#[derive(Debug)]
pub struct FileDb<V> {
    base_dir: PathBuf,
    // Serializes index read-modify-write cycles within this process
    index_lock: Mutex<()>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> FileDb<V> {
    /// Create a store rooted at `base_dir`; directories are created lazily.
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            index_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn primary_dir(&self, primary: &str) -> PathBuf {
        self.base_dir.join(file_name(primary))
    }

    fn value_path(&self, primary: &str, secondary: &str) -> PathBuf {
        self.primary_dir(primary).join(file_name(secondary))
    }

    fn read_index(&self, primary: &str) -> Result<Vec<String>> {
        let path = self.primary_dir(primary).join(INDEX_FILE);
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(FragmentsError::storage(format!(
                "Failed to read index {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn write_index(&self, primary: &str, keys: &[String]) -> Result<()> {
        let dir = self.primary_dir(primary);
        if keys.is_empty() {
            remove_if_exists(&dir.join(INDEX_FILE))?;
            // Only succeeds once the directory holds nothing else
            let _ = fs::remove_dir(&dir);
            return Ok(());
        }
        write_atomic(&dir, &dir.join(INDEX_FILE), &serde_json::to_vec(keys)?)
    }
}

impl<V> KeyedStore<V> for FileDb<V>
where
    V: StoredValue,
{
    fn put(&self, primary: &str, secondary: &str, value: V) -> Result<()> {
        check_keys(primary, secondary)?;
        let encoded = value.encode()?;

        let _guard = self.index_lock.lock();
        let dir = self.primary_dir(primary);
        ensure_dir(&dir)?;
        write_atomic(&dir, &self.value_path(primary, secondary), &encoded)?;

        let mut keys = self.read_index(primary)?;
        if !keys.iter().any(|k| k == secondary) {
            keys.push(secondary.to_string());
            self.write_index(primary, &keys)?;
        }
        Ok(())
    }

    fn get(&self, primary: &str, secondary: &str) -> Result<Option<V>> {
        check_keys(primary, secondary)?;
        let path = self.value_path(primary, secondary);
        match fs::read(&path) {
            Ok(bytes) => V::decode(bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FragmentsError::storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn query(&self, primary: &str) -> Result<Vec<V>> {
        check_key("primary", primary)?;
        let _guard = self.index_lock.lock();
        let mut values = Vec::new();
        for secondary in self.read_index(primary)? {
            match self.get(primary, &secondary)? {
                Some(value) => values.push(value),
                None => warn!(primary, secondary = %secondary, "Index entry without a stored value"),
            }
        }
        Ok(values)
    }

    fn del(&self, primary: &str, secondary: &str) -> Result<()> {
        check_keys(primary, secondary)?;
        let _guard = self.index_lock.lock();
        let path = self.value_path(primary, secondary);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FragmentsError::not_found(format!(
                    "primary={primary}, secondary={secondary}"
                )));
            }
            Err(e) => {
                return Err(FragmentsError::storage(format!(
                    "Failed to delete {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        let mut keys = self.read_index(primary)?;
        keys.retain(|k| k != secondary);
        self.write_index(primary, &keys)
    }
}

/// Fixed-length path component for a key.
fn file_name(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Ensure the directory exists, creating it if necessary
fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            FragmentsError::storage(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| {
        FragmentsError::storage(format!("Failed to write {}: {}", path.display(), e))
    })?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bytes(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_file_db_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let db: FileDb<Bytes> = FileDb::with_base_dir(temp_dir.path());

        assert!(db.put("owner", "a", bytes("first")).is_ok());
        assert_eq!(db.get("owner", "a").unwrap(), Some(bytes("first")));

        db.put("owner", "a", bytes("second")).unwrap();
        assert_eq!(db.get("owner", "a").unwrap(), Some(bytes("second")));

        db.del("owner", "a").unwrap();
        assert_eq!(db.get("owner", "a").unwrap(), None);
        assert!(db.query("owner").unwrap().is_empty());
    }

    #[test]
    fn test_file_db_query_order_and_isolation() {
        let temp_dir = TempDir::new().unwrap();
        let db: FileDb<Bytes> = FileDb::with_base_dir(temp_dir.path());

        db.put("owner1", "z", bytes("1")).unwrap();
        db.put("owner1", "a", bytes("2")).unwrap();
        db.put("owner2", "m", bytes("3")).unwrap();
        db.put("owner1", "z", bytes("4")).unwrap();

        assert_eq!(db.query("owner1").unwrap(), vec![bytes("4"), bytes("2")]);
        assert_eq!(db.query("owner2").unwrap(), vec![bytes("3")]);
        assert!(db.query("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_file_db_keys_with_path_characters() {
        let temp_dir = TempDir::new().unwrap();
        let db: FileDb<Bytes> = FileDb::with_base_dir(temp_dir.path());

        db.put("../../etc", "a/b\\c", bytes("safe")).unwrap();
        assert_eq!(db.get("../../etc", "a/b\\c").unwrap(), Some(bytes("safe")));
        assert!(db.primary_dir("../../etc").starts_with(temp_dir.path()));
    }

    #[test]
    fn test_file_db_long_keys() {
        let temp_dir = TempDir::new().unwrap();
        let db: FileDb<Bytes> = FileDb::with_base_dir(temp_dir.path());
        let owner = "o".repeat(300);
        let id = "é".repeat(200);

        db.put(&owner, &id, bytes("long")).unwrap();
        assert_eq!(db.get(&owner, &id).unwrap(), Some(bytes("long")));
        assert_eq!(db.query(&owner).unwrap(), vec![bytes("long")]);

        let name = db.value_path(&owner, &id);
        assert_eq!(name.file_name().unwrap().len(), 64);
        db.del(&owner, &id).unwrap();
        assert_eq!(db.get(&owner, &id).unwrap(), None);
    }

    #[test]
    fn test_file_db_missing_and_invalid_keys() {
        let temp_dir = TempDir::new().unwrap();
        let db: FileDb<Bytes> = FileDb::with_base_dir(temp_dir.path());

        assert_eq!(db.get("owner1", "missing").unwrap(), None);
        assert!(matches!(
            db.del("owner1", "missing"),
            Err(FragmentsError::NotFound(_))
        ));
        assert!(matches!(
            db.put("", "a", bytes("x")),
            Err(FragmentsError::InvalidKey(_))
        ));
        assert!(matches!(db.query(""), Err(FragmentsError::InvalidKey(_))));
    }

    #[test]
    fn test_file_db_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let db: FileDb<Bytes> = FileDb::with_base_dir(temp_dir.path());
            db.put("owner", "a", bytes("kept")).unwrap();
        }
        let reopened: FileDb<Bytes> = FileDb::with_base_dir(temp_dir.path());
        assert_eq!(reopened.query("owner").unwrap(), vec![bytes("kept")]);
    }
}
