pub mod backend;
pub mod error;
pub mod object_store;
pub mod reader;

pub use backend::{BlockMeta, CompactedBlockMeta};
pub use error::{Result, StorageError};
pub use crate::object_store::create_object_store;
pub use reader::{BackendReader, TenantBlocks};
