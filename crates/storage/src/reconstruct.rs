//! Versioned row reconstruction over tablet keyspaces.
//!
//! A tablet snapshot at block `B` is rebuilt in two phases: replay the
//! newest checkpoint index at or below `B` (an explicit multi-get of every
//! indexed row), then scan the delta rows written after the checkpoint up
//! to `B`.  Events are pushed into a caller-supplied [`RowSink`]; applying
//! them in delivery order to an initially empty accumulator yields the
//! snapshot, with later deltas overwriting earlier state and empty values
//! acting as tombstones.

use fluxdb_db::{keys, DbError, DbResult, StateStore, FETCH_ROWS_CHUNK_SIZE};
use tracing::*;

use crate::cache::IndexCache;

/// Observer receiving row events during snapshot reconstruction.
///
/// Indexed rows are delivered before delta rows; delta rows arrive in
/// ascending `(block_num, primary_key)` order.  Both callbacks may fail,
/// which aborts the reconstruction with the error wrapped around the
/// offending row key.
pub trait RowSink {
    fn row_updated(&mut self, block_num: u32, primary_key: &str, value: &[u8]) -> DbResult<()>;

    fn row_deleted(&mut self, block_num: u32, primary_key: &str) -> DbResult<()>;
}

/// First scannable row key of the delta range following a checkpoint (or
/// the whole tablet when starting from block 0).
fn scan_lower_bound(table_key: &str, from_block_num: u32) -> String {
    format!("{table_key}:{}", keys::hex_block_num(from_block_num))
}

/// Exclusive upper bound covering every row of the tablet with a block
/// number at or below `block_num`.
fn scan_upper_bound(table_key: &str, block_num: u32) -> String {
    match block_num.checked_add(1) {
        Some(next) => format!("{table_key}:{}", keys::hex_block_num(next)),
        // Reading at u32::MAX: bound by the next possible prefix instead,
        // ';' being the successor of ':'.
        None => format!("{table_key};"),
    }
}

/// Rebuilds the full snapshot of `table_key` at `block_num` into `sink`.
pub fn read_tablet<S: StateStore>(
    store: &S,
    index_cache: &IndexCache,
    table_key: &str,
    block_num: u32,
    sink: &mut dyn RowSink,
) -> DbResult<()> {
    debug!(%table_key, block_num, "reading tablet rows");

    let index = index_cache.get_index(store, table_key, block_num)?;

    let mut first_row_key = scan_lower_bound(table_key, 0);
    let last_row_key = scan_upper_bound(table_key, block_num);

    if let Some(index) = index.as_deref() {
        debug!(
            row_count = index.map.len(),
            at_block_num = index.at_block_num,
            "checkpoint index exists, reconciling it"
        );
        first_row_key = match index.at_block_num.checked_add(1) {
            Some(next) => scan_lower_bound(table_key, next),
            // Checkpoint taken at u32::MAX: nothing can follow it.
            None => last_row_key.clone(),
        };

        let indexed_keys: Vec<String> = index
            .map
            .iter()
            .map(|(primary_key, row_block_num)| {
                keys::writable_row_key(table_key, *row_block_num, primary_key)
            })
            .collect();

        // All indexed rows are fetched, which could be millions; batching
        // keeps each serialized multi-get response bounded and lets the
        // adapter parallelize within a chunk.
        for chunk in indexed_keys.chunks(FETCH_ROWS_CHUNK_SIZE) {
            trace!(key_count = chunk.len(), "reading indexed rows chunk");
            let mut key_read = false;
            store.fetch_tablet_rows(chunk, |row_key, value| {
                if value.is_empty() {
                    return Err(DbError::EmptyIndexedRow(row_key.to_string()));
                }

                let (row_block_num, primary_key) =
                    keys::explode_writable_row_key(table_key, row_key)?;
                sink.row_updated(row_block_num, primary_key, value)
                    .map_err(|e| DbError::callback(row_key, e))?;

                key_read = true;
                Ok(())
            })?;

            if !key_read {
                return Err(DbError::MissingIndexedRows(chunk[0].clone()));
            }
        }

        debug!("finished reconciling checkpoint index");
    }

    trace!(%first_row_key, %last_row_key, "scanning tablet deltas");

    let mut updated_count = 0usize;
    let mut deleted_count = 0usize;

    store.scan_tablet_rows(&first_row_key, &last_row_key, |row_key, value| {
        let (row_block_num, primary_key) = keys::explode_writable_row_key(table_key, row_key)?;

        if value.is_empty() {
            sink.row_deleted(row_block_num, primary_key)
                .map_err(|e| DbError::callback(row_key, e))?;
            deleted_count += 1;
        } else {
            sink.row_updated(row_block_num, primary_key, value)
                .map_err(|e| DbError::callback(row_key, e))?;
            updated_count += 1;
        }

        Ok(())
    })?;

    debug!(updated_count, deleted_count, "finished reading tablet rows");
    Ok(())
}

/// Rebuilds the state of a single primary key of `table_key` at
/// `block_num` into `sink`.
///
/// When a checkpoint index covers the tablet it is authoritative: a
/// primary key absent from it yields
/// [`DbError::RowNotFound`].  Without a checkpoint, absence simply means no
/// events are delivered and the caller draws its own conclusion.
pub fn read_tablet_single<S: StateStore>(
    store: &S,
    index_cache: &IndexCache,
    table_key: &str,
    primary_key: &str,
    block_num: u32,
    sink: &mut dyn RowSink,
) -> DbResult<()> {
    debug!(%table_key, %primary_key, block_num, "reading single tablet row");

    let index = index_cache.get_index(store, table_key, block_num)?;

    let mut first_row_key = scan_lower_bound(table_key, 0);
    let last_row_key = scan_upper_bound(table_key, block_num);

    if let Some(index) = index.as_deref() {
        first_row_key = match index.at_block_num.checked_add(1) {
            Some(next) => scan_lower_bound(table_key, next),
            None => last_row_key.clone(),
        };

        let Some(row_block_num) = index.map.get(primary_key) else {
            return Err(DbError::RowNotFound {
                primary_key: primary_key.to_string(),
            });
        };

        let row_key = keys::writable_row_key(table_key, *row_block_num, primary_key);
        let Some(value) = store.fetch_tablet_row(&row_key)? else {
            return Err(DbError::MissingIndexedRow(row_key));
        };
        if value.is_empty() {
            return Err(DbError::EmptyIndexedRow(row_key));
        }

        sink.row_updated(*row_block_num, primary_key, &value)
            .map_err(|e| DbError::callback(&row_key, e))?;

        debug!("finished reconciling checkpoint index");
    }

    trace!(%first_row_key, %last_row_key, "scanning tablet deltas for single row");

    store.scan_tablet_rows(&first_row_key, &last_row_key, |row_key, value| {
        let (row_block_num, candidate) = keys::explode_writable_row_key(table_key, row_key)?;
        if candidate != primary_key {
            return Ok(());
        }

        if value.is_empty() {
            sink.row_deleted(row_block_num, candidate)
                .map_err(|e| DbError::callback(row_key, e))
        } else {
            sink.row_updated(row_block_num, candidate, value)
                .map_err(|e| DbError::callback(row_key, e))
        }
    })?;

    Ok(())
}
