//! Storage-local types: checkpoint indexes, speculative write batches, and
//! the typed request/response shapes of the query surface.

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use fluxdb_primitives::Name;
use serde::{Deserialize, Serialize};

use crate::keys;

/// Checkpoint of a tablet's live rows at a specific block.
///
/// Maps every primary key live at `at_block_num` to the block that last
/// wrote it.  Produced by the write pipeline and authoritative over the
/// whole range `[0, at_block_num]`: reconstruction at a later block never
/// needs to look at delta rows at or below the checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TableIndex {
    pub at_block_num: u32,
    pub map: BTreeMap<String, u32>,
}

impl TableIndex {
    pub fn new(at_block_num: u32) -> Self {
        Self {
            at_block_num,
            map: BTreeMap::new(),
        }
    }
}

/// One per-block batch of speculative writes, overlaid on the persisted
/// snapshot for the duration of a single query.  Batches are applied in the
/// order the caller supplies them; deletions of absent rows are no-ops.
#[derive(
    Clone, Debug, Default, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct WriteBatch {
    pub block_num: u32,
    pub table_datas: Vec<TableDataEntry>,
    pub key_accounts: Vec<KeyAccountEntry>,
    pub auth_links: Vec<AuthLinkEntry>,
    pub table_scopes: Vec<TableScopeEntry>,
    pub abis: Vec<AbiEntry>,
}

/// Speculative write of one contract table row.
#[derive(
    Clone, Debug, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct TableDataEntry {
    pub account: Name,
    pub scope: Name,
    pub table: Name,
    pub primary_key: u64,
    pub payer: Name,
    pub data: Vec<u8>,
    pub deletion: bool,
}

/// Speculative write of one public-key→account mapping.
#[derive(
    Clone, Debug, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct KeyAccountEntry {
    pub public_key: String,
    pub account: Name,
    pub permission: Name,
    pub deletion: bool,
}

/// Speculative write of one linked permission.
#[derive(
    Clone, Debug, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct AuthLinkEntry {
    pub account: Name,
    pub contract: Name,
    pub action: Name,
    pub permission_name: Name,
    pub deletion: bool,
}

/// Speculative write of one table-scope row.
#[derive(
    Clone, Debug, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct TableScopeEntry {
    pub account: Name,
    pub table: Name,
    pub scope: Name,
    pub deletion: bool,
}

/// Speculative ABI update.  ABIs are never deleted, so there is no deletion
/// flag; an empty `packed_abi` hides the account's ABI for this query.
#[derive(
    Clone, Debug, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct AbiEntry {
    pub account: Name,
    pub packed_abi: Vec<u8>,
}

/// One decoded contract table row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub key: u64,
    pub payer: Name,
    pub data: Vec<u8>,
    pub block_num: u32,
}

/// One decoded linked permission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedPermission {
    pub contract: Name,
    pub action: Name,
    pub permission_name: Name,
}

/// The packed ABI of an account as of some block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiRow {
    pub account: Name,
    pub block_num: u32,
    pub packed_abi: Vec<u8>,
}

/// Request for a full contract table snapshot at a block height.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReadTableRequest {
    pub account: Name,
    pub scope: Name,
    pub table: Name,
    pub block_num: u32,
    pub speculative_writes: Vec<WriteBatch>,
}

impl ReadTableRequest {
    /// Table key of the tablet this request addresses.
    pub fn table_key(&self) -> String {
        keys::table_data_key(self.account, self.scope, self.table)
    }
}

/// Request for a single contract table row at a block height.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReadTableRowRequest {
    pub account: Name,
    pub scope: Name,
    pub table: Name,
    pub primary_key: u64,
    pub block_num: u32,
    pub speculative_writes: Vec<WriteBatch>,
}

impl ReadTableRowRequest {
    pub fn table_key(&self) -> String {
        keys::table_data_key(self.account, self.scope, self.table)
    }

    /// The primary key in its stored string form.
    pub fn primary_key_string(&self) -> String {
        keys::hex_primary_key(self.primary_key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTableResponse {
    pub abi: AbiRow,
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTableRowResponse {
    pub abi: AbiRow,
    pub row: Option<TableRow>,
}
