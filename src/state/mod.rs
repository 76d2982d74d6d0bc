//! Replicated state.
//!
//! - [`repository`] - Keyed, ordered collection per entity kind
//! - [`aggregate`] - All repositories behind one reader/writer lock
//! - [`persistence`] - Atomic snapshot files
//!
//! # Invariants
//!
//! - The aggregate lock is the only concurrency boundary; repositories have none.
//! - Every mutation (commit, cleaning, reload) happens under the write lock.
//! - Snapshot writes never replace the previous file until the new one is synced.

pub mod aggregate;
pub mod persistence;
pub mod repository;

pub use aggregate::{ApplyOutcome, CleanReport, ExpirationPolicy, State, StateAggregate};
pub use persistence::{Persistence, SnapshotInfo};
pub use repository::Repository;
