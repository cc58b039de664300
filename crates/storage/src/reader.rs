//! Tablet query façades over the reconstruction engine.
//!
//! One façade per tablet family: each builds its table key, accumulates
//! engine events into a typed map, applies the caller's speculative writes
//! on top, and decodes/sorts the final rows.  The public surface is
//! [`StateReadOps`], generated with blocking and async variants of every
//! operation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fluxdb_db::types::{
    AbiRow, LinkedPermission, ReadTableRequest, ReadTableRowRequest, ReadTableRowResponse,
    ReadTableResponse, TableRow, WriteBatch,
};
use fluxdb_db::{keys, DbError, DbResult, StateStore};
use fluxdb_primitives::{BlockRef, Name};
use tracing::*;

use crate::cache::IndexCache;
use crate::exec::inst_reader_ops;
use crate::marker::{check_clean_for_sharding, fetch_last_written_block, is_next_block};
use crate::reconstruct::{read_tablet, read_tablet_single, RowSink};

/// Shared state behind every read operation: the backing store, the
/// checkpoint-index cache, and this instance's shard identity.
pub struct ReadContext<S> {
    store: Arc<S>,
    index_cache: IndexCache,
    shard_index: Option<u32>,
}

impl<S: StateStore> ReadContext<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_shard(store, None)
    }

    /// A context for a shard instance; its last-written-block marker lives
    /// under the shard's own key.
    pub fn with_shard(store: Arc<S>, shard_index: Option<u32>) -> Self {
        Self {
            store,
            index_cache: IndexCache::default(),
            shard_index,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index_cache(&self) -> &IndexCache {
        &self.index_cache
    }

    pub(crate) fn last_block_key(&self) -> String {
        match self.shard_index {
            Some(idx) => keys::shard_last_block_key(idx),
            None => keys::LAST_BLOCK_ROW_KEY.to_string(),
        }
    }

    /// Wraps the context into the public ops handle, dispatching async
    /// calls onto `pool`.
    pub fn into_ops(self, pool: threadpool::ThreadPool) -> StateReadOps {
        StateReadOps::new(pool, Arc::new(self))
    }
}

inst_reader_ops! {
    (StateReadOps => ReadContext) {
        read_table(req: ReadTableRequest) => ReadTableResponse;
        read_table_row(req: ReadTableRowRequest) => ReadTableRowResponse;
        read_key_accounts(block_num: u32, public_key: String, speculative_writes: Vec<WriteBatch>) => Vec<Name>;
        read_linked_permissions(block_num: u32, account: Name, speculative_writes: Vec<WriteBatch>) => Vec<LinkedPermission>;
        read_table_scopes(block_num: u32, account: Name, table: Name, speculative_writes: Vec<WriteBatch>) => Vec<Name>;
        get_abi(block_num: u32, account: Name, speculative_writes: Vec<WriteBatch>) => AbiRow;
        has_seen_public_key(public_key: String) => bool;
        has_seen_table(account: Name, table: Name) => bool;
        fetch_last_written_block() => BlockRef;
        check_clean_for_sharding() => ();
        is_next_block(write_block_num: u32) => ();
    }
}

fn be_u64(bytes: &[u8]) -> Option<u64> {
    let prefix: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(prefix))
}

fn decode_table_row(block_num: u32, primary_key: &str, value: &[u8]) -> DbResult<TableRow> {
    // Non-tombstone table data always starts with the 8-byte payer.
    let payer = be_u64(value).ok_or_else(|| DbError::ShortTableDataRow(primary_key.to_string()))?;
    let key = keys::table_data_primary_key(primary_key)?;

    Ok(TableRow {
        key,
        payer: Name::new(payer),
        data: value[8..].to_vec(),
        block_num,
    })
}

/// Accumulates decoded contract table rows keyed by primary-key string.
#[derive(Default)]
struct TableRowSink {
    rows: HashMap<String, TableRow>,
}

impl RowSink for TableRowSink {
    fn row_updated(&mut self, block_num: u32, primary_key: &str, value: &[u8]) -> DbResult<()> {
        let row = decode_table_row(block_num, primary_key, value)?;
        self.rows.insert(primary_key.to_string(), row);
        Ok(())
    }

    fn row_deleted(&mut self, _block_num: u32, primary_key: &str) -> DbResult<()> {
        self.rows.remove(primary_key);
        Ok(())
    }
}

/// Accumulates bare primary-key presence, for tablets whose identity is
/// entirely in the key (key→accounts, table scopes).
#[derive(Default)]
struct PresenceSink {
    rows: HashSet<String>,
}

impl RowSink for PresenceSink {
    fn row_updated(&mut self, _block_num: u32, primary_key: &str, _value: &[u8]) -> DbResult<()> {
        self.rows.insert(primary_key.to_string());
        Ok(())
    }

    fn row_deleted(&mut self, _block_num: u32, primary_key: &str) -> DbResult<()> {
        self.rows.remove(primary_key);
        Ok(())
    }
}

/// Accumulates decoded linked permissions keyed by primary-key string.
#[derive(Default)]
struct LinkedPermissionSink {
    rows: HashMap<String, LinkedPermission>,
}

impl RowSink for LinkedPermissionSink {
    fn row_updated(&mut self, _block_num: u32, primary_key: &str, value: &[u8]) -> DbResult<()> {
        let (contract, action) = keys::auth_link_primary_key(primary_key)?;
        let permission =
            be_u64(value).ok_or_else(|| DbError::ShortAuthLinkRow(primary_key.to_string()))?;

        self.rows.insert(
            primary_key.to_string(),
            LinkedPermission {
                contract: Name::new(contract),
                action: Name::new(action),
                permission_name: Name::new(permission),
            },
        );
        Ok(())
    }

    fn row_deleted(&mut self, _block_num: u32, primary_key: &str) -> DbResult<()> {
        self.rows.remove(primary_key);
        Ok(())
    }
}

fn read_table<S: StateStore>(
    ctx: &ReadContext<S>,
    req: ReadTableRequest,
) -> DbResult<ReadTableResponse> {
    debug!(
        account = %req.account,
        scope = %req.scope,
        table = %req.table,
        block_num = req.block_num,
        "reading state table"
    );

    let table_key = req.table_key();
    let mut sink = TableRowSink::default();
    read_tablet(
        ctx.store(),
        ctx.index_cache(),
        &table_key,
        req.block_num,
        &mut sink,
    )?;

    let abi = get_abi_at(ctx, req.block_num, req.account, &req.speculative_writes)?;

    debug!(write_count = req.speculative_writes.len(), "handling speculative writes");
    let mut rows = sink.rows;
    for batch in &req.speculative_writes {
        for entry in &batch.table_datas {
            if entry.account != req.account || entry.scope != req.scope || entry.table != req.table
            {
                continue;
            }

            let primary_key = keys::hex_primary_key(entry.primary_key);
            if entry.deletion {
                rows.remove(&primary_key);
            } else {
                rows.insert(
                    primary_key,
                    TableRow {
                        key: entry.primary_key,
                        payer: entry.payer,
                        data: entry.data.clone(),
                        block_num: batch.block_num,
                    },
                );
            }
        }
    }

    debug!(row_count = rows.len(), "post-processing table rows");
    let mut rows: Vec<TableRow> = rows.into_values().collect();
    rows.sort_unstable_by_key(|row| row.key);

    Ok(ReadTableResponse { abi, rows })
}

fn read_table_row<S: StateStore>(
    ctx: &ReadContext<S>,
    req: ReadTableRowRequest,
) -> DbResult<ReadTableRowResponse> {
    debug!(
        account = %req.account,
        scope = %req.scope,
        table = %req.table,
        primary_key = req.primary_key,
        block_num = req.block_num,
        "reading state table row"
    );

    let table_key = req.table_key();
    let primary_key = req.primary_key_string();

    let mut sink = TableRowSink::default();
    read_tablet_single(
        ctx.store(),
        ctx.index_cache(),
        &table_key,
        &primary_key,
        req.block_num,
        &mut sink,
    )?;

    let abi = get_abi_at(ctx, req.block_num, req.account, &req.speculative_writes)?;

    debug!(write_count = req.speculative_writes.len(), "handling speculative writes");
    let mut row = sink.rows.remove(&primary_key);
    for batch in &req.speculative_writes {
        for entry in &batch.table_datas {
            if entry.account != req.account
                || entry.scope != req.scope
                || entry.table != req.table
                || entry.primary_key != req.primary_key
            {
                continue;
            }

            row = if entry.deletion {
                None
            } else {
                Some(TableRow {
                    key: entry.primary_key,
                    payer: entry.payer,
                    data: entry.data.clone(),
                    block_num: batch.block_num,
                })
            };
        }
    }

    Ok(ReadTableRowResponse { abi, row })
}

fn read_key_accounts<S: StateStore>(
    ctx: &ReadContext<S>,
    block_num: u32,
    public_key: String,
    speculative_writes: Vec<WriteBatch>,
) -> DbResult<Vec<Name>> {
    debug!(%public_key, block_num, "reading key accounts");

    let table_key = keys::key_account_key(&public_key);
    let mut sink = PresenceSink::default();
    read_tablet(ctx.store(), ctx.index_cache(), &table_key, block_num, &mut sink)?;

    debug!(write_count = speculative_writes.len(), "handling speculative writes");
    let mut rows = sink.rows;
    for batch in &speculative_writes {
        for entry in &batch.key_accounts {
            if entry.public_key != public_key {
                continue;
            }

            let primary_key = format!("{}:{}", entry.account.to_hex(), entry.permission.to_hex());
            if entry.deletion {
                rows.remove(&primary_key);
            } else {
                rows.insert(primary_key);
            }
        }
    }

    debug!(key_account_count = rows.len(), "post-processing key accounts");
    let mut account_set = HashSet::new();
    for primary_key in &rows {
        let (account, _permission) = keys::key_account_primary_key(primary_key)?;
        account_set.insert(account);
    }

    let mut accounts: Vec<Name> = account_set.into_iter().map(Name::new).collect();
    accounts.sort_by_cached_key(|name| name.to_string());
    Ok(accounts)
}

fn read_linked_permissions<S: StateStore>(
    ctx: &ReadContext<S>,
    block_num: u32,
    account: Name,
    speculative_writes: Vec<WriteBatch>,
) -> DbResult<Vec<LinkedPermission>> {
    debug!(%account, block_num, "reading linked permissions");

    let table_key = keys::auth_link_key(account);
    let mut sink = LinkedPermissionSink::default();
    read_tablet(ctx.store(), ctx.index_cache(), &table_key, block_num, &mut sink)?;

    debug!(write_count = speculative_writes.len(), "handling speculative writes");
    let mut rows = sink.rows;
    for batch in &speculative_writes {
        for entry in &batch.auth_links {
            if entry.account != account {
                continue;
            }

            let primary_key = format!("{}:{}", entry.contract.to_hex(), entry.action.to_hex());
            if entry.deletion {
                rows.remove(&primary_key);
            } else {
                rows.insert(
                    primary_key,
                    LinkedPermission {
                        contract: entry.contract,
                        action: entry.action,
                        permission_name: entry.permission_name,
                    },
                );
            }
        }
    }

    debug!(linked_permission_count = rows.len(), "post-processing linked permissions");
    let mut permissions: Vec<LinkedPermission> = rows.into_values().collect();
    permissions.sort_by_cached_key(|p| (p.contract.to_string(), p.action.to_string()));
    Ok(permissions)
}

fn read_table_scopes<S: StateStore>(
    ctx: &ReadContext<S>,
    block_num: u32,
    account: Name,
    table: Name,
    speculative_writes: Vec<WriteBatch>,
) -> DbResult<Vec<Name>> {
    debug!(%account, %table, block_num, "reading table scopes");

    let table_key = keys::table_scope_key(account, table);
    let mut sink = PresenceSink::default();
    read_tablet(ctx.store(), ctx.index_cache(), &table_key, block_num, &mut sink)?;

    debug!(write_count = speculative_writes.len(), "handling speculative writes");
    let mut rows = sink.rows;
    for batch in &speculative_writes {
        for entry in &batch.table_scopes {
            if entry.account != account || entry.table != table {
                continue;
            }

            let primary_key = entry.scope.to_hex();
            if entry.deletion {
                rows.remove(&primary_key);
            } else {
                rows.insert(primary_key);
            }
        }
    }

    debug!(table_scope_count = rows.len(), "post-processing table scopes");
    let mut scopes = Vec::with_capacity(rows.len());
    for primary_key in &rows {
        scopes.push(Name::new(keys::table_scope_primary_key(primary_key)?));
    }
    scopes.sort_by_cached_key(|scope| scope.to_string());
    Ok(scopes)
}

fn get_abi<S: StateStore>(
    ctx: &ReadContext<S>,
    block_num: u32,
    account: Name,
    speculative_writes: Vec<WriteBatch>,
) -> DbResult<AbiRow> {
    get_abi_at(ctx, block_num, account, &speculative_writes)
}

fn get_abi_at<S: StateStore>(
    ctx: &ReadContext<S>,
    block_num: u32,
    account: Name,
    speculative_writes: &[WriteBatch],
) -> DbResult<AbiRow> {
    debug!(%account, block_num, "fetching ABI");

    let mut out = AbiRow {
        account,
        block_num: 0,
        packed_abi: Vec::new(),
    };

    let prefix_key = keys::abi_prefix_key(account);
    let first_key = format!("{prefix_key}{}", keys::hex_rev_block_num(block_num));
    let last_key = format!("{prefix_key}{}", keys::hex_rev_block_num(0));

    trace!(%first_key, %last_key, "reading ABI rows");
    if let Some((row_key, packed_abi)) = ctx.store().fetch_abi_row(&prefix_key, &first_key, &last_key)? {
        out.block_num = keys::chunk_key_rev_block_num(&row_key, &prefix_key)?;
        out.packed_abi = packed_abi;
    }

    debug!(write_count = speculative_writes.len(), "handling speculative writes");
    for batch in speculative_writes {
        for entry in &batch.abis {
            if entry.account == account {
                trace!(block_num = batch.block_num, "updating ABI");
                out = AbiRow {
                    account,
                    block_num: batch.block_num,
                    packed_abi: entry.packed_abi.clone(),
                };
            }
        }
    }

    if out.packed_abi.is_empty() {
        return Err(DbError::AbiNotFound { account, block_num });
    }

    Ok(out)
}

fn has_seen_public_key<S: StateStore>(ctx: &ReadContext<S>, public_key: String) -> DbResult<bool> {
    has_row_key_prefix(ctx, &keys::key_account_key(&public_key))
}

fn has_seen_table<S: StateStore>(ctx: &ReadContext<S>, account: Name, table: Name) -> DbResult<bool> {
    has_row_key_prefix(ctx, &keys::table_scope_key(account, table))
}

fn has_row_key_prefix<S: StateStore>(ctx: &ReadContext<S>, key_prefix: &str) -> DbResult<bool> {
    debug!(%key_prefix, "has row key prefix");
    ctx.store().has_tablet_row(key_prefix)
}
