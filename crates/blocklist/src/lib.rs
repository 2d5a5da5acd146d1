//! In-memory catalog of the blocks each tenant currently has in the backend.
//!
//! The [`List`] merges two update streams: full snapshots from the [`Poller`]
//! and incremental mutations from compaction. Incremental mutations are replayed
//! on top of the next snapshot(s) so that a listing which has not caught up yet
//! cannot undo them.

pub mod error;
pub mod list;
pub mod metrics;
pub mod poller;

pub use error::{BlocklistError, Result};
pub use list::{List, PerTenant, PerTenantCompacted};
pub use metrics::BlocklistMetrics;
pub use poller::Poller;
