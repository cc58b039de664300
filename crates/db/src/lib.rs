//! Storage interfaces for the FluxDB read path: the ordered-store adapter
//! trait, the row-key grammar, storage-local types and the error taxonomy.

pub mod errors;
pub mod keys;
pub mod traits;
pub mod types;

pub use errors::{DbError, DbResult};
pub use traits::{StateStore, FETCH_ROWS_CHUNK_SIZE};
