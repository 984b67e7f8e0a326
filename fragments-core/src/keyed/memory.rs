/*!
In-process keyed store.
*/

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{check_key, check_keys, KeyedStore};
use crate::{FragmentsError, Result};

/// In-memory [`KeyedStore`] backed by a map of insertion-ordered maps.
///
/// Values are cloned out on read, so `V` should be cheap to clone
/// (`bytes::Bytes` for payloads, small records for metadata).
#[derive(Debug)]
pub struct MemoryDb<V> {
    data: RwLock<HashMap<String, IndexMap<String, V>>>,
}

impl<V> MemoryDb<V> {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Number of values across all primary keys.
    pub fn len(&self) -> usize {
        self.data.read().values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for MemoryDb<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedStore<V> for MemoryDb<V>
where
    V: Clone + Send + Sync,
{
    fn put(&self, primary: &str, secondary: &str, value: V) -> Result<()> {
        check_keys(primary, secondary)?;
        self.data
            .write()
            .entry(primary.to_string())
            .or_default()
            .insert(secondary.to_string(), value);
        Ok(())
    }

    fn get(&self, primary: &str, secondary: &str) -> Result<Option<V>> {
        check_keys(primary, secondary)?;
        Ok(self
            .data
            .read()
            .get(primary)
            .and_then(|items| items.get(secondary))
            .cloned())
    }

    fn query(&self, primary: &str) -> Result<Vec<V>> {
        check_key("primary", primary)?;
        Ok(self
            .data
            .read()
            .get(primary)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default())
    }

    fn del(&self, primary: &str, secondary: &str) -> Result<()> {
        check_keys(primary, secondary)?;
        let mut data = self.data.write();
        let items = data.get_mut(primary).ok_or_else(|| {
            FragmentsError::not_found(format!("primary={primary}, secondary={secondary}"))
        })?;
        // shift_remove keeps the remaining entries in insertion order
        if items.shift_remove(secondary).is_none() {
            return Err(FragmentsError::not_found(format!(
                "primary={primary}, secondary={secondary}"
            )));
        }
        if items.is_empty() {
            data.remove(primary);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::{json, Value};

    #[test]
    fn test_put_then_get() {
        let db = MemoryDb::new();
        assert!(db.put("a", "b", json!({"value": 123})).is_ok());
        assert_eq!(db.get("a", "b").unwrap(), Some(json!({"value": 123})));
    }

    #[test]
    fn test_put_and_get_bytes() {
        let db = MemoryDb::new();
        db.put("a", "b", Bytes::from_static(&[1, 2, 3])).unwrap();
        assert_eq!(db.get("a", "b").unwrap(), Some(Bytes::from_static(&[1, 2, 3])));
    }

    #[test]
    fn test_get_missing_is_absent() {
        let db = MemoryDb::new();
        db.put("a", "b", 123).unwrap();
        assert_eq!(db.get("a", "c").unwrap(), None);
        assert_eq!(db.get("owner1", "missing").unwrap(), None);
    }

    #[test]
    fn test_query_insertion_order() {
        let db = MemoryDb::new();
        db.put("a", "c", json!({"value": 1})).unwrap();
        db.put("a", "a", json!({"value": 2})).unwrap();
        db.put("a", "b", json!({"value": 3})).unwrap();
        // overwriting keeps the original slot
        db.put("a", "c", json!({"value": 4})).unwrap();

        let results: Vec<Value> = db.query("a").unwrap();
        assert_eq!(
            results,
            vec![json!({"value": 4}), json!({"value": 2}), json!({"value": 3})]
        );
    }

    #[test]
    fn test_query_unknown_primary_is_empty() {
        let db = MemoryDb::new();
        db.put("b", "a", 1).unwrap();
        assert!(db.query("a").unwrap().is_empty());
    }

    #[test]
    fn test_del_removes_value() {
        let db = MemoryDb::new();
        db.put("a", "a", 1).unwrap();
        db.put("a", "b", 2).unwrap();
        db.del("a", "a").unwrap();
        assert_eq!(db.get("a", "a").unwrap(), None);
        assert_eq!(db.query("a").unwrap(), vec![2]);
        db.del("a", "b").unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_del_missing_is_not_found() {
        let db: MemoryDb<i32> = MemoryDb::new();
        assert!(matches!(
            db.del("owner1", "missing"),
            Err(FragmentsError::NotFound(_))
        ));
        db.put("owner1", "present", 1).unwrap();
        assert!(matches!(
            db.del("owner1", "missing"),
            Err(FragmentsError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_keys_rejected() {
        let db: MemoryDb<i32> = MemoryDb::new();
        assert!(matches!(db.put("", "b", 1), Err(FragmentsError::InvalidKey(_))));
        assert!(matches!(db.put("a", "", 1), Err(FragmentsError::InvalidKey(_))));
        assert!(matches!(db.get("", ""), Err(FragmentsError::InvalidKey(_))));
        assert!(matches!(db.query(""), Err(FragmentsError::InvalidKey(_))));
        assert!(matches!(db.del("a", ""), Err(FragmentsError::InvalidKey(_))));
    }

    #[test]
    fn test_concurrent_writers_on_distinct_keys() {
        let db = std::sync::Arc::new(MemoryDb::new());
        let handles: Vec<_> = (0..8)
            .map(|owner| {
                let db = std::sync::Arc::clone(&db);
                std::thread::spawn(move || {
                    for item in 0..50 {
                        db.put(&format!("owner{owner}"), &format!("item{item}"), item)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(db.len(), 8 * 50);
        assert_eq!(db.query("owner3").unwrap(), (0..50).collect::<Vec<_>>());
    }
}
