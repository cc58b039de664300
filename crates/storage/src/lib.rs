//! Point-in-time read path over a versioned tablet store.
//!
//! Rebuilds table snapshots at arbitrary historical blocks by replaying
//! checkpoint indexes and delta rows out of an ordered key-value store,
//! overlays caller-supplied speculative writes, and serves the typed query
//! surface (contract tables, key→accounts, linked permissions, table
//! scopes, ABIs, marker checks).

pub mod cache;
mod exec;
mod marker;
pub mod reconstruct;
mod reader;

pub use cache::IndexCache;
pub use exec::OpsError;
pub use reader::{ReadContext, StateReadOps};
pub use reconstruct::{read_tablet, read_tablet_single, RowSink};
