//! Trait definitions for the ordered-store interface the read path
//! consumes.  The backing store only needs point gets, bounded scans and
//! multi-gets over string keys; everything temporal is encoded in the keys
//! themselves.

use fluxdb_primitives::BlockRef;

use crate::DbResult;

/// Upper bound on keys per multi-get batch, keeping each serialized batch
/// comfortably under the backing store's payload limits (~1 MB).  This is a
/// payload bound, not a concurrency bound; adapters are free to parallelize
/// within a chunk as long as `on_row` is invoked serially.
pub const FETCH_ROWS_CHUNK_SIZE: usize = 5000;

/// Read-only interface over the backing ordered key-value store.
///
/// Implementations may block on network I/O in any method.  Errors,
/// including cancellation ([`DbError::Canceled`](crate::DbError::Canceled)),
/// are surfaced to callers unchanged; retrying is the adapter's concern.
pub trait StateStore: Send + Sync + 'static {
    /// Returns the first row of the lexicographic scan of
    /// `[first_key, last_key]` under `prefix`, or `None` when the range is
    /// empty.  ABI row keys are reverse-block-encoded, so the first row is
    /// the newest ABI at or below the queried block.
    fn fetch_abi_row(
        &self,
        prefix: &str,
        first_key: &str,
        last_key: &str,
    ) -> DbResult<Option<(String, Vec<u8>)>>;

    /// Same contract as [`fetch_abi_row`](Self::fetch_abi_row), for
    /// checkpoint-index rows.
    fn fetch_index_row(
        &self,
        prefix: &str,
        first_key: &str,
        last_key: &str,
    ) -> DbResult<Option<(String, Vec<u8>)>>;

    /// Point get of a single tablet row.
    fn fetch_tablet_row(&self, key: &str) -> DbResult<Option<Vec<u8>>>;

    /// Multi-get of up to [`FETCH_ROWS_CHUNK_SIZE`] explicit keys, invoking
    /// `on_row` serially for every key that resolves to a row.  Missing
    /// keys are skipped silently; it is the caller's job to decide whether
    /// that is acceptable.
    fn fetch_tablet_rows<F>(&self, keys: &[String], on_row: F) -> DbResult<()>
    where
        F: FnMut(&str, &[u8]) -> DbResult<()>;

    /// Ordered scan over the half-open key range `[first_key, last_key)`,
    /// invoking `on_row` serially in ascending key order.
    fn scan_tablet_rows<F>(&self, first_key: &str, last_key: &str, on_row: F) -> DbResult<()>
    where
        F: FnMut(&str, &[u8]) -> DbResult<()>;

    /// Returns whether any row has ever been written under `prefix`.
    fn has_tablet_row(&self, prefix: &str) -> DbResult<bool>;

    /// Fetches the last-written-block marker stored under `key`, or `None`
    /// when the marker has never been written.
    fn fetch_last_written_block(&self, key: &str) -> DbResult<Option<BlockRef>>;
}
