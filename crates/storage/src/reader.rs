use crate::backend::{BlockMeta, CompactedBlockMeta, COMPACTED_META_NAME, META_NAME};
use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use futures_util::stream::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Block IDs found under one tenant by a single listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantBlocks {
    /// Blocks with a `meta.json` and no `meta.compacted.json`
    pub live: Vec<Uuid>,
    /// Blocks with a `meta.compacted.json`
    pub compacted: Vec<Uuid>,
}

/// BackendReader - Lists tenants and blocks and reads block meta documents
///
/// Layout below the prefix: `<tenant>/<blockID>/meta.json` and
/// `<tenant>/<blockID>/meta.compacted.json`.
#[derive(Debug, Clone)]
pub struct BackendReader {
    object_store: Arc<dyn ObjectStore>,
    root: ObjectPath,
}

impl BackendReader {
    pub fn new(object_store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            object_store,
            root: ObjectPath::from(prefix.trim_matches('/')),
        }
    }

    /// Tenant names directly below the prefix, sorted
    pub async fn tenants(&self) -> Result<Vec<String>> {
        let listing = self.object_store.list_with_delimiter(self.root()).await?;

        let mut tenants: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect();
        tenants.sort();

        debug!(count = tenants.len(), prefix = %self.root, "Listed tenants");
        Ok(tenants)
    }

    /// Classify every block of a tenant as live or compacted from one listing
    pub async fn blocks(&self, tenant: &str) -> Result<TenantBlocks> {
        let tenant_path = self.tenant_path(tenant);
        let depth = tenant_path.parts().count();

        let objects: Vec<_> = self
            .object_store
            .list(Some(&tenant_path))
            .try_collect()
            .await?;

        let mut live = BTreeSet::new();
        let mut compacted = BTreeSet::new();

        for object in &objects {
            let parts: Vec<_> = object.location.parts().collect();
            if parts.len() != depth + 2 {
                continue;
            }

            let Ok(block_id) = Uuid::parse_str(parts[depth].as_ref()) else {
                continue;
            };

            match parts[depth + 1].as_ref() {
                META_NAME => {
                    live.insert(block_id);
                }
                COMPACTED_META_NAME => {
                    compacted.insert(block_id);
                }
                _ => {}
            }
        }

        // A compacted marker wins over a leftover meta.json
        live.retain(|id| !compacted.contains(id));

        debug!(
            tenant = %tenant,
            objects = objects.len(),
            live = live.len(),
            compacted = compacted.len(),
            "Listed tenant blocks"
        );

        Ok(TenantBlocks {
            live: live.into_iter().collect(),
            compacted: compacted.into_iter().collect(),
        })
    }

    /// Read `meta.json` of a block, `None` if it no longer exists
    pub async fn block_meta(&self, tenant: &str, block_id: Uuid) -> Result<Option<BlockMeta>> {
        let path = self.block_path(tenant, block_id).child(META_NAME);
        Ok(self.read_meta(&path).await?.map(|(meta, _)| meta))
    }

    /// Read `meta.compacted.json` of a block, `None` if it no longer exists
    pub async fn compacted_block_meta(
        &self,
        tenant: &str,
        block_id: Uuid,
    ) -> Result<Option<CompactedBlockMeta>> {
        let path = self.block_path(tenant, block_id).child(COMPACTED_META_NAME);
        Ok(self
            .read_meta(&path)
            .await?
            .map(|(meta, modified)| CompactedBlockMeta::new(meta, modified)))
    }

    fn root(&self) -> Option<&ObjectPath> {
        if self.root.as_ref().is_empty() {
            None
        } else {
            Some(&self.root)
        }
    }

    fn tenant_path(&self, tenant: &str) -> ObjectPath {
        self.root.child(tenant)
    }

    fn block_path(&self, tenant: &str, block_id: Uuid) -> ObjectPath {
        self.tenant_path(tenant).child(block_id.to_string())
    }

    async fn read_meta(&self, path: &ObjectPath) -> Result<Option<(BlockMeta, DateTime<Utc>)>> {
        let result = match self.object_store.get(path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let last_modified = result.meta.last_modified;
        let bytes = match result.bytes().await {
            Ok(bytes) => bytes,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let meta = serde_json::from_slice(&bytes).map_err(|source| StorageError::MetaParse {
            path: path.to_string(),
            source,
        })?;

        Ok(Some((meta, last_modified)))
    }
}
