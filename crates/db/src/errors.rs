//! Error taxonomy for the state read path and its storage adapters.

use fluxdb_primitives::Name;
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by the state read path.
///
/// `AbiNotFound` and `RowNotFound` are user-visible outcomes; the various
/// malformed/missing-row variants indicate a corrupted store and are fatal
/// to the request.  Adapter errors, including cancellation, pass through
/// unchanged in kind; the read path performs no retries of its own.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    /// No ABI row at or below the requested block, after speculative
    /// overlay.
    #[error("no ABI for account {account} at block {block_num}")]
    AbiNotFound { account: Name, block_num: u32 },

    /// The checkpoint index is authoritative for the queried range and does
    /// not contain the requested primary key.
    #[error("row {primary_key} not found")]
    RowNotFound { primary_key: String },

    /// An indexed row carried an empty value; indexes never record
    /// deletions, so empty rows make no sense there.
    #[error("indexed row {0} has empty value")]
    EmptyIndexedRow(String),

    /// A multi-get over a chunk of indexed keys returned no rows at all.
    #[error("indexed keys starting at {0} yielded no rows")]
    MissingIndexedRows(String),

    /// A single indexed key resolved to no row.
    #[error("indexed key {0} yielded no row")]
    MissingIndexedRow(String),

    /// A stored row key did not match its tablet's key grammar.
    #[error("malformed row key {0}")]
    MalformedRowKey(String),

    /// A stored checkpoint index failed to decode.
    #[error("malformed checkpoint index row {row_key}: {message}")]
    MalformedIndex { row_key: String, message: String },

    /// A contract table row too short to carry its payer prefix.
    #[error("table data row {0} shorter than the payer prefix")]
    ShortTableDataRow(String),

    /// An auth link row too short to carry its permission name.
    #[error("auth link row {0} missing permission value")]
    ShortAuthLinkRow(String),

    /// A primary-key string did not match its tablet family's encoding.
    #[error("malformed primary key {0}")]
    MalformedPrimaryKey(String),

    /// A row sink failed while consuming a reconstruction event.
    #[error("row callback failed for {row_key}")]
    Callback {
        row_key: String,
        #[source]
        source: Box<DbError>,
    },

    /// The live injector's last-written-block marker is present where a
    /// clean database was expected.
    #[error("last written block marker present, expected no element to exist")]
    ShardingMarkerPresent,

    /// The block being written does not follow the last written block.
    #[error("block {got} does not follow last block {last} in db")]
    NotNextBlock { got: u32, last: u32 },

    /// An ops-shim worker dropped its response channel.
    #[error("worker failed strangely")]
    WorkerFailedStrangely,

    /// The surrounding request was canceled while an adapter call was in
    /// flight.
    #[error("operation canceled")]
    Canceled,

    /// Any other storage adapter failure.
    #[error("store: {0}")]
    Store(String),
}

impl DbError {
    /// Wraps a sink error with the row key that triggered it.
    pub fn callback(row_key: impl Into<String>, source: DbError) -> Self {
        Self::Callback {
            row_key: row_key.into(),
            source: Box::new(source),
        }
    }
}
