//! In-memory ordered-map backend for the FluxDB state store interface.
//!
//! Backed by a `BTreeMap` so range and prefix semantics match a real
//! ordered store exactly.  Used as the test substrate for the read path and
//! as a reference backend for embedding.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use fluxdb_db::types::TableIndex;
use fluxdb_db::{keys, DbResult, StateStore};
use fluxdb_primitives::BlockRef;
use tracing::*;

/// An ordered in-memory state store.
///
/// The write surface (`set_row`, `write_index`, `set_last_written_block`)
/// is the minimal one the read path's collaborators need; a tombstone is
/// written as a row with an empty value, exactly as it is stored at rest.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    rows: RwLock<BTreeMap<String, Vec<u8>>>,
    markers: RwLock<BTreeMap<String, BlockRef>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one raw row.  An empty value is a tombstone.
    pub fn set_row(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        trace!(%key, "writing row");
        self.rows_mut().insert(key, value.into());
    }

    /// Writes a tombstone for `key`: a row with an empty value, marking
    /// the primary key deleted at that block.
    pub fn delete_row(&self, key: impl Into<String>) {
        self.set_row(key, Vec::new());
    }

    /// Writes a checkpoint index under its reverse-block-encoded key.
    pub fn write_index(&self, table_key: &str, index: &TableIndex) {
        let key = format!(
            "{}{}",
            keys::index_prefix_key(table_key),
            keys::hex_rev_block_num(index.at_block_num)
        );
        // Serialization into a Vec cannot fail for this type.
        let value = borsh::to_vec(index).expect("index serialization");
        debug!(%table_key, at_block_num = index.at_block_num, "writing checkpoint index");
        self.rows_mut().insert(key, value);
    }

    /// Writes a last-written-block marker.
    pub fn set_last_written_block(&self, key: impl Into<String>, block: BlockRef) {
        self.markers_mut().insert(key.into(), block);
    }

    /// Number of raw rows currently stored, markers excluded.
    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    fn rows(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.rows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn rows_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.rows.write().unwrap_or_else(|e| e.into_inner())
    }

    fn markers_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, BlockRef>> {
        self.markers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn first_row_in_range(
        &self,
        prefix: &str,
        first_key: &str,
        last_key: &str,
    ) -> Option<(String, Vec<u8>)> {
        let rows = self.rows();
        let mut range = rows.range::<str, _>((
            Bound::Included(first_key),
            Bound::Included(last_key),
        ));
        range
            .next()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
    }
}

impl StateStore for MemoryStateStore {
    fn fetch_abi_row(
        &self,
        prefix: &str,
        first_key: &str,
        last_key: &str,
    ) -> DbResult<Option<(String, Vec<u8>)>> {
        Ok(self.first_row_in_range(prefix, first_key, last_key))
    }

    fn fetch_index_row(
        &self,
        prefix: &str,
        first_key: &str,
        last_key: &str,
    ) -> DbResult<Option<(String, Vec<u8>)>> {
        Ok(self.first_row_in_range(prefix, first_key, last_key))
    }

    fn fetch_tablet_row(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.rows().get(key).cloned())
    }

    fn fetch_tablet_rows<F>(&self, keys: &[String], mut on_row: F) -> DbResult<()>
    where
        F: FnMut(&str, &[u8]) -> DbResult<()>,
    {
        let rows = self.rows();
        for key in keys {
            if let Some(value) = rows.get(key) {
                on_row(key, value)?;
            }
        }
        Ok(())
    }

    fn scan_tablet_rows<F>(&self, first_key: &str, last_key: &str, mut on_row: F) -> DbResult<()>
    where
        F: FnMut(&str, &[u8]) -> DbResult<()>,
    {
        let rows = self.rows();
        for (key, value) in rows.range::<str, _>((
            Bound::Included(first_key),
            Bound::Excluded(last_key),
        )) {
            on_row(key, value)?;
        }
        Ok(())
    }

    fn has_tablet_row(&self, prefix: &str) -> DbResult<bool> {
        let rows = self.rows();
        Ok(rows
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .next()
            .is_some_and(|(key, _)| key.starts_with(prefix)))
    }

    fn fetch_last_written_block(&self, key: &str) -> DbResult<Option<BlockRef>> {
        Ok(self
            .markers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use fluxdb_db::DbError;
    use fluxdb_primitives::Buf32;

    use super::*;

    #[test]
    fn test_scan_is_half_open_and_ordered() {
        let store = MemoryStateStore::new();
        store.set_row("tk:00000001:aa", b"1".to_vec());
        store.set_row("tk:00000002:aa", b"2".to_vec());
        store.set_row("tk:00000003:aa", b"3".to_vec());

        let mut seen = Vec::new();
        store
            .scan_tablet_rows("tk:00000001:aa", "tk:00000003:aa", |key, value| {
                seen.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![
                ("tk:00000001:aa".to_string(), b"1".to_vec()),
                ("tk:00000002:aa".to_string(), b"2".to_vec()),
            ]
        );
    }

    #[test]
    fn test_scan_propagates_callback_error() {
        let store = MemoryStateStore::new();
        store.set_row("tk:00000001:aa", b"1".to_vec());

        let res = store.scan_tablet_rows("tk:", "tk;", |_, _| Err(DbError::Canceled));
        assert!(matches!(res, Err(DbError::Canceled)));
    }

    #[test]
    fn test_first_row_in_range_is_inclusive() {
        let store = MemoryStateStore::new();
        store.set_row("aa:fffffffa", b"old".to_vec());
        store.set_row("aa:fffffff4", b"new".to_vec());

        // First key at or after the lower bound wins.
        let (key, value) = store
            .fetch_abi_row("aa:", "aa:fffffff8", "aa:ffffffff")
            .unwrap()
            .expect("row in range");
        assert_eq!(key, "aa:fffffffa");
        assert_eq!(value, b"old".to_vec());

        // Exact match on the lower bound is included.
        let (key, _) = store
            .fetch_abi_row("aa:", "aa:fffffff4", "aa:ffffffff")
            .unwrap()
            .expect("row in range");
        assert_eq!(key, "aa:fffffff4");

        // A row outside the prefix is not returned.
        let store = MemoryStateStore::new();
        store.set_row("ab:00000001", b"x".to_vec());
        assert!(store.fetch_abi_row("aa:", "aa:", "aa:ffffffff").unwrap().is_none());
    }

    #[test]
    fn test_multi_get_skips_missing_keys() {
        let store = MemoryStateStore::new();
        store.set_row("k1", b"v1".to_vec());
        store.set_row("k3", b"v3".to_vec());

        let keys = vec!["k1".to_string(), "k2".to_string(), "k3".to_string()];
        let mut seen = Vec::new();
        store
            .fetch_tablet_rows(&keys, |key, _| {
                seen.push(key.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["k1".to_string(), "k3".to_string()]);
    }

    #[test]
    fn test_has_tablet_row() {
        let store = MemoryStateStore::new();
        assert!(!store.has_tablet_row("ka2:KEY").unwrap());
        // A tombstone still counts: the probe is historical existence.
        store.delete_row("ka2:KEY:00000001:aa:bb");
        assert!(store.has_tablet_row("ka2:KEY").unwrap());
        assert!(!store.has_tablet_row("ka2:OTHER").unwrap());
    }

    #[test]
    fn test_markers() {
        let store = MemoryStateStore::new();
        assert!(store.fetch_last_written_block("last").unwrap().is_none());

        let block = BlockRef::new(9, Buf32::from([3u8; 32]));
        store.set_last_written_block("last", block);
        assert_eq!(store.fetch_last_written_block("last").unwrap(), Some(block));
        assert!(store.fetch_last_written_block("shard-001").unwrap().is_none());
    }

    #[test]
    fn test_index_roundtrip_through_store() {
        let store = MemoryStateStore::new();
        let mut index = TableIndex::new(7);
        index.map.insert("0000000000000010".to_string(), 5);
        store.write_index("a:b:c", &index);

        let prefix = keys::index_prefix_key("a:b:c");
        let first = format!("{prefix}{}", keys::hex_rev_block_num(10));
        let last = format!("{prefix}{}", keys::hex_rev_block_num(0));
        let (row_key, value) = store
            .fetch_index_row(&prefix, &first, &last)
            .unwrap()
            .expect("index row");

        assert_eq!(keys::chunk_key_rev_block_num(&row_key, &prefix).unwrap(), 7);
        let decoded: TableIndex = borsh::from_slice(&value).expect("decode index");
        assert_eq!(decoded, index);
    }
}
