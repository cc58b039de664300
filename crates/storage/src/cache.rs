//! Checkpoint-index cache.
//!
//! Holds the newest checkpoint index seen per tablet so repeated reads of a
//! hot tablet skip the store round trip.  A cached index older than the
//! newest one available in the store only costs efficiency, never
//! correctness: the delta scan that follows it covers the gap.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use fluxdb_db::types::TableIndex;
use fluxdb_db::{keys, DbError, DbResult, StateStore};
use lru::LruCache;
use tracing::*;

/// Default number of tablets whose newest checkpoint index is retained.
pub const DEFAULT_INDEX_CACHE_SIZE: usize = 1024;

/// LRU of the newest checkpoint index per table key.  Safe for concurrent
/// readers; entries are only ever replaced by strictly newer checkpoints.
pub struct IndexCache {
    entries: Mutex<LruCache<String, Arc<TableIndex>>>,
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_CACHE_SIZE.try_into().unwrap_or(NonZeroUsize::MIN))
    }
}

impl IndexCache {
    pub fn new(size: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(size)),
        }
    }

    /// Returns the newest checkpoint index for `table_key` whose
    /// `at_block_num` is at or below `block_num`, or `None` when the tablet
    /// has no usable checkpoint yet.
    pub fn get_index<S: StateStore>(
        &self,
        store: &S,
        table_key: &str,
        block_num: u32,
    ) -> DbResult<Option<Arc<TableIndex>>> {
        if let Some(cached) = self.lock().get(table_key).cloned() {
            if cached.at_block_num <= block_num {
                trace!(%table_key, at_block_num = cached.at_block_num, "checkpoint index cache hit");
                return Ok(Some(cached));
            }
            // The cached checkpoint sits above the queried block; look for
            // an older one in the store without evicting the newer entry.
        }

        let prefix = keys::index_prefix_key(table_key);
        let first_key = format!("{prefix}{}", keys::hex_rev_block_num(block_num));
        let last_key = format!("{prefix}{}", keys::hex_rev_block_num(0));

        trace!(%table_key, block_num, "fetching checkpoint index");
        let Some((row_key, value)) = store.fetch_index_row(&prefix, &first_key, &last_key)? else {
            return Ok(None);
        };

        let at_block_num = keys::chunk_key_rev_block_num(&row_key, &prefix)?;
        let index: TableIndex = borsh::from_slice(&value).map_err(|e| DbError::MalformedIndex {
            row_key: row_key.clone(),
            message: e.to_string(),
        })?;
        if index.at_block_num != at_block_num {
            return Err(DbError::MalformedIndex {
                row_key,
                message: format!(
                    "key says block {at_block_num}, payload says block {}",
                    index.at_block_num
                ),
            });
        }

        let index = Arc::new(index);
        self.store_if_newer(table_key, index.clone());
        Ok(Some(index))
    }

    /// Drops the cached entry for `table_key`.
    pub fn purge(&self, table_key: &str) {
        self.lock().pop(table_key);
    }

    fn store_if_newer(&self, table_key: &str, index: Arc<TableIndex>) {
        let mut entries = self.lock();
        if let Some(existing) = entries.peek(table_key) {
            if existing.at_block_num >= index.at_block_num {
                return;
            }
        }
        entries.put(table_key.to_string(), index);
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<TableIndex>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use fluxdb_db_store_memory::MemoryStateStore;

    use super::*;

    fn index_with(at_block_num: u32, entries: &[(&str, u32)]) -> TableIndex {
        let mut index = TableIndex::new(at_block_num);
        for (pk, bn) in entries {
            index.map.insert(pk.to_string(), *bn);
        }
        index
    }

    #[test]
    fn test_fetch_and_cache() {
        let store = MemoryStateStore::new();
        store.write_index("a:b:c", &index_with(7, &[("0000000000000010", 5)]));

        let cache = IndexCache::default();
        let idx = cache
            .get_index(&store, "a:b:c", 10)
            .unwrap()
            .expect("index present");
        assert_eq!(idx.at_block_num, 7);
        assert_eq!(idx.map.get("0000000000000010"), Some(&5));

        assert!(cache.get_index(&store, "a:b:c", 6).unwrap().is_none());
        assert!(cache.get_index(&store, "x:y:z", 10).unwrap().is_none());
    }

    #[test]
    fn test_stale_cache_entry_is_tolerated() {
        let store = MemoryStateStore::new();
        store.write_index("a:b:c", &index_with(5, &[]));

        let cache = IndexCache::default();
        let first = cache.get_index(&store, "a:b:c", 20).unwrap().expect("index");
        assert_eq!(first.at_block_num, 5);

        // A newer checkpoint lands but the cached one keeps being served;
        // only efficiency suffers.
        store.write_index("a:b:c", &index_with(15, &[]));
        let second = cache.get_index(&store, "a:b:c", 20).unwrap().expect("index");
        assert_eq!(second.at_block_num, 5);

        cache.purge("a:b:c");
        let third = cache.get_index(&store, "a:b:c", 20).unwrap().expect("index");
        assert_eq!(third.at_block_num, 15);
    }

    #[test]
    fn test_lower_block_query_does_not_regress_cache() {
        let store = MemoryStateStore::new();
        store.write_index("a:b:c", &index_with(4, &[]));
        store.write_index("a:b:c", &index_with(10, &[]));

        let cache = IndexCache::default();
        let high = cache.get_index(&store, "a:b:c", 12).unwrap().expect("index");
        assert_eq!(high.at_block_num, 10);

        // Query below the cached checkpoint: served from the store, without
        // evicting the newer cached entry.
        let low = cache.get_index(&store, "a:b:c", 6).unwrap().expect("index");
        assert_eq!(low.at_block_num, 4);

        let high_again = cache.get_index(&store, "a:b:c", 12).unwrap().expect("index");
        assert_eq!(high_again.at_block_num, 10);
    }

    #[test]
    fn test_malformed_index_errors() {
        let store = MemoryStateStore::new();
        let prefix = keys::index_prefix_key("a:b:c");
        store.set_row(format!("{prefix}{}", keys::hex_rev_block_num(7)), b"junk".to_vec());

        let cache = IndexCache::default();
        assert!(matches!(
            cache.get_index(&store, "a:b:c", 10),
            Err(DbError::MalformedIndex { .. })
        ));
    }
}
