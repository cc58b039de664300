//! Last-written-block marker operations.

use fluxdb_db::{keys, DbError, DbResult, StateStore};
use fluxdb_primitives::BlockRef;
use tracing::*;

use crate::reader::ReadContext;

/// Fetches this instance's last-written-block marker, the zero reference
/// when the marker has never been written.
pub(crate) fn fetch_last_written_block<S: StateStore>(ctx: &ReadContext<S>) -> DbResult<BlockRef> {
    let row_key = ctx.last_block_key();
    debug!(%row_key, "fetching last written block");

    match ctx.store().fetch_last_written_block(&row_key)? {
        Some(block) => Ok(block),
        None => {
            info!("last written block empty, returning zero block ref");
            Ok(BlockRef::zero())
        }
    }
}

/// Verifies that no live injector has written into this database, as
/// required before shard reprocessing.  Always inspects the non-shard
/// marker, whatever this instance's shard identity.
pub(crate) fn check_clean_for_sharding<S: StateStore>(ctx: &ReadContext<S>) -> DbResult<()> {
    match ctx.store().fetch_last_written_block(keys::LAST_BLOCK_ROW_KEY)? {
        // Nothing stored is exactly what we expect here.
        None => Ok(()),
        Some(_) => Err(DbError::ShardingMarkerPresent),
    }
}

/// Verifies that `write_block_num` directly follows the marker.  Stored
/// heights 0 and 1 are additionally accepted so a fresh writer can
/// bootstrap against an empty or just-seeded database.
pub(crate) fn is_next_block<S: StateStore>(
    ctx: &ReadContext<S>,
    write_block_num: u32,
) -> DbResult<()> {
    debug!(block_num = write_block_num, "checking if is next block");

    let last_block = fetch_last_written_block(ctx)?;
    let last_block_num = last_block.num() as u32;

    if last_block_num != write_block_num.wrapping_sub(1)
        && last_block_num != 0
        && last_block_num != 1
    {
        return Err(DbError::NotNextBlock {
            got: write_block_num,
            last: last_block_num,
        });
    }

    Ok(())
}
