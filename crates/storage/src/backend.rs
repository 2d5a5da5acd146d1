use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the document describing a live block
pub const META_NAME: &str = "meta.json";

/// Name of the document marking a block as compacted
pub const COMPACTED_META_NAME: &str = "meta.compacted.json";

/// Metadata of one immutable block, as stored in `<tenant>/<blockID>/meta.json`
///
/// The catalog only ever compares blocks by `block_id`; every other field is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    /// Block encoding format (e.g. "vParquet4")
    #[serde(default)]
    pub format: String,
    #[serde(rename = "blockID")]
    pub block_id: Uuid,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub total_objects: i64,
    /// Size in bytes of the block's data object
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub compaction_level: u8,
}

impl BlockMeta {
    /// Create a meta with the given identity and an empty time range at now
    pub fn new(tenant_id: impl Into<String>, block_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            format: String::new(),
            block_id,
            tenant_id: tenant_id.into(),
            start_time: now,
            end_time: now,
            total_objects: 0,
            size: 0,
            compaction_level: 0,
        }
    }

    /// Object path of this block's meta document, relative to the backend prefix
    pub fn meta_path(&self) -> String {
        format!("{}/{}/{}", self.tenant_id, self.block_id, META_NAME)
    }

    pub fn compacted_meta_path(&self) -> String {
        format!("{}/{}/{}", self.tenant_id, self.block_id, COMPACTED_META_NAME)
    }
}

impl AsRef<BlockMeta> for BlockMeta {
    fn as_ref(&self) -> &BlockMeta {
        self
    }
}

/// A block superseded by compaction but retained for a grace period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedBlockMeta {
    pub block_meta: BlockMeta,
    /// Last modification of the `meta.compacted.json` object
    pub compacted_time: DateTime<Utc>,
}

impl CompactedBlockMeta {
    pub fn new(block_meta: BlockMeta, compacted_time: DateTime<Utc>) -> Self {
        Self {
            block_meta,
            compacted_time,
        }
    }

    pub fn block_id(&self) -> Uuid {
        self.block_meta.block_id
    }
}

impl AsRef<BlockMeta> for CompactedBlockMeta {
    fn as_ref(&self) -> &BlockMeta {
        &self.block_meta
    }
}
