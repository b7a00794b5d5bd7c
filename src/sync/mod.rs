//! Keeps local caches of the remote collections and routes local writes.
//!
//! - [`reconcile`] - pure, id-keyed merge of snapshots and local writes
//! - [`LocalCache`] - per-collection posts plus feed status
//! - [`SyncAdapter`] - live or snapshot mode, create/update/delete
//!
//! In live mode each collection has a standing subscription whose snapshots
//! replace the cache entry. Local writes are spliced in as soon as the store
//! acknowledges them, in both modes, and reconciliation removes the duplicate
//! once the live feed catches up.

mod adapter;
mod cache;
pub mod reconcile;

pub use adapter::{decode_snapshot, DeleteOutcome, LiveSubscription, SyncAdapter, SyncError};
pub use cache::{FeedStatus, LocalCache};
pub use reconcile::reconcile;
