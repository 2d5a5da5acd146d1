use crate::error::Result;
use crate::list::{List, PerTenant, PerTenantCompacted};
use crate::metrics::BlocklistMetrics;
use config::BlocklistConfig;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{BackendReader, BlockMeta, CompactedBlockMeta, StorageError};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of reading one listed block
enum PolledBlock {
    Live(BlockMeta),
    Compacted(CompactedBlockMeta),
    /// Deleted between the listing and the read
    Missing,
}

/// Poller - Builds full blocklist snapshots from the backend
///
/// A snapshot is only returned when every tenant was listed successfully. Since
/// the list treats a tenant missing from a snapshot as having no blocks, a
/// partial snapshot must never be applied.
#[derive(Debug)]
pub struct Poller {
    reader: BackendReader,
    concurrency: usize,
    metrics: Option<BlocklistMetrics>,
}

impl Poller {
    pub fn new(reader: BackendReader, config: &BlocklistConfig) -> Self {
        Self {
            reader,
            concurrency: config.poll_concurrency.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: BlocklistMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// List every tenant and read the meta of each of its blocks
    pub async fn poll(&self) -> Result<(PerTenant, PerTenantCompacted)> {
        let start = Instant::now();
        let result = self.poll_tenants().await;

        if let Some(metrics) = &self.metrics {
            metrics.observe_poll_duration(start.elapsed().as_secs_f64());
            if result.is_err() {
                metrics.inc_poll_errors();
            }
        }

        result
    }

    /// Poll and apply the snapshot to `list`. On failure the list is left as is.
    pub async fn poll_and_apply(&self, list: &List) -> Result<()> {
        let (metas, compacted) = self.poll().await?;
        list.apply_poll_results(metas, compacted);

        if let Some(metrics) = &self.metrics {
            metrics.record_blocklist(list);
        }
        Ok(())
    }

    /// Poll now and then every `interval` until `shutdown` fires
    pub async fn run(
        &self,
        list: Arc<List>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(interval_secs = interval.as_secs(), "Starting blocklist poller");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_and_apply(&list).await {
                        error!(error = %e, "Blocklist poll failed, keeping previous blocklist");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Blocklist poller stopping");
                    return;
                }
            }
        }
    }

    async fn poll_tenants(&self) -> Result<(PerTenant, PerTenantCompacted)> {
        let tenants = self.reader.tenants().await?;

        let mut metas = PerTenant::new();
        let mut compacted = PerTenantCompacted::new();

        for tenant in tenants {
            let (live, dead) = self.poll_tenant(&tenant).await?;

            // Tenants are defined by their live blocks only
            if !live.is_empty() {
                metas.insert(tenant.clone(), live);
            }
            if !dead.is_empty() {
                compacted.insert(tenant, dead);
            }
        }

        info!(
            "Polled {} tenants: {} blocks, {} compacted blocks",
            metas.len(),
            metas.values().map(Vec::len).sum::<usize>(),
            compacted.values().map(Vec::len).sum::<usize>()
        );

        Ok((metas, compacted))
    }

    async fn poll_tenant(
        &self,
        tenant: &str,
    ) -> Result<(Vec<Arc<BlockMeta>>, Vec<Arc<CompactedBlockMeta>>)> {
        let blocks = self.reader.blocks(tenant).await?;

        let live_results: Vec<_> = stream::iter(blocks.live)
            .map(|block_id| self.read_live(tenant, block_id))
            .buffered(self.concurrency)
            .collect()
            .await;

        let compacted_results: Vec<_> = stream::iter(blocks.compacted)
            .map(|block_id| self.read_compacted(tenant, block_id))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut live = Vec::new();
        let mut compacted = Vec::new();
        let mut skipped = 0;

        for result in live_results.into_iter().chain(compacted_results) {
            match result {
                Ok(PolledBlock::Live(meta)) => live.push(Arc::new(meta)),
                Ok(PolledBlock::Compacted(meta)) => compacted.push(Arc::new(meta)),
                Ok(PolledBlock::Missing) => {}
                Err(e) if e.is_block_local() => {
                    warn!(tenant = %tenant, error = %e, "Skipping block with invalid meta");
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            "Found {} live and {} compacted blocks for tenant '{}' ({} skipped)",
            live.len(),
            compacted.len(),
            tenant,
            skipped
        );

        Ok((live, compacted))
    }

    async fn read_live(
        &self,
        tenant: &str,
        block_id: Uuid,
    ) -> std::result::Result<PolledBlock, StorageError> {
        if let Some(meta) = self.reader.block_meta(tenant, block_id).await? {
            return Ok(PolledBlock::Live(meta));
        }

        // Compacted between the listing and the read
        debug!(tenant = %tenant, block_id = %block_id, "Live meta vanished, checking compacted meta");
        self.read_compacted(tenant, block_id).await
    }

    async fn read_compacted(
        &self,
        tenant: &str,
        block_id: Uuid,
    ) -> std::result::Result<PolledBlock, StorageError> {
        Ok(match self.reader.compacted_block_meta(tenant, block_id).await? {
            Some(meta) => PolledBlock::Compacted(meta),
            None => PolledBlock::Missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::{ObjectStore, PutPayload};
    use prometheus::Registry;

    const PREFIX: &str = "traces";

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    async fn put(store: &InMemory, path: String, body: Vec<u8>) {
        store
            .put(&ObjectPath::from(path), PutPayload::from(body))
            .await
            .unwrap();
    }

    async fn put_live(store: &InMemory, tenant: &str, n: u128) {
        let meta = BlockMeta::new(tenant, id(n));
        put(store, format!("{}/{}", PREFIX, meta.meta_path()), serde_json::to_vec(&meta).unwrap()).await;
    }

    async fn put_compacted(store: &InMemory, tenant: &str, n: u128) {
        let meta = BlockMeta::new(tenant, id(n));
        put(
            store,
            format!("{}/{}", PREFIX, meta.compacted_meta_path()),
            serde_json::to_vec(&meta).unwrap(),
        )
        .await;
    }

    fn poller(store: Arc<InMemory>) -> Poller {
        Poller::new(BackendReader::new(store, PREFIX), &BlocklistConfig::default())
    }

    fn ids<T: AsRef<BlockMeta>>(metas: &[Arc<T>]) -> Vec<u128> {
        metas.iter().map(|m| (**m).as_ref().block_id.as_u128()).collect()
    }

    #[tokio::test]
    async fn test_poll() {
        let store = Arc::new(InMemory::new());
        put_live(&store, "a", 1).await;
        put_live(&store, "a", 2).await;
        put_compacted(&store, "a", 3).await;
        put_live(&store, "b", 4).await;
        put_compacted(&store, "retired", 5).await;

        let (metas, compacted) = poller(store).poll().await.unwrap();

        let mut tenants: Vec<_> = metas.keys().cloned().collect();
        tenants.sort();
        assert_eq!(tenants, vec!["a", "b"]);
        assert_eq!(ids(&metas["a"]), vec![1, 2]);
        assert_eq!(ids(&metas["b"]), vec![4]);
        assert_eq!(ids(&compacted["a"]), vec![3]);
        assert_eq!(ids(&compacted["retired"]), vec![5]);
        assert!(!compacted.contains_key("b"));
    }

    #[tokio::test]
    async fn test_poll_empty_backend() {
        let (metas, compacted) = poller(Arc::new(InMemory::new())).poll().await.unwrap();
        assert!(metas.is_empty());
        assert!(compacted.is_empty());
    }

    #[tokio::test]
    async fn test_poll_skips_invalid_meta() {
        let store = Arc::new(InMemory::new());
        put_live(&store, "a", 1).await;
        put(&store, format!("{}/a/{}/meta.json", PREFIX, id(2)), b"not json".to_vec()).await;

        let (metas, _) = poller(store).poll().await.unwrap();
        assert_eq!(ids(&metas["a"]), vec![1]);
    }

    fn gauge(registry: &Registry, name: &str, tenant: Option<&str>) -> Option<f64> {
        registry
            .gather()
            .iter()
            .find(|f| f.get_name() == name)?
            .get_metric()
            .iter()
            .find(|m| match tenant {
                Some(tenant) => m.get_label().iter().any(|l| l.get_value() == tenant),
                None => true,
            })
            .map(|m| m.get_gauge().get_value())
    }

    #[tokio::test]
    async fn test_poll_and_apply_records_metrics() {
        let store = Arc::new(InMemory::new());
        put_live(&store, "a", 1).await;

        let registry = Registry::new();
        let metrics = BlocklistMetrics::new(&registry).unwrap();
        let poller = poller(store).with_metrics(metrics);
        poller.poll_and_apply(&List::new()).await.unwrap();

        assert_eq!(gauge(&registry, "tempodb_blocklist_tenants", None), Some(1.0));
        assert_eq!(gauge(&registry, "tempodb_blocklist_length", Some("a")), Some(1.0));
    }

    #[tokio::test]
    async fn test_block_gauges_follow_replayed_update() {
        let store = Arc::new(InMemory::new());
        put_live(&store, "a", 1).await;
        put_live(&store, "a", 2).await;

        let registry = Registry::new();
        let metrics = BlocklistMetrics::new(&registry).unwrap();
        let poller = poller(store).with_metrics(metrics);
        let list = List::new();
        poller.poll_and_apply(&list).await.unwrap();

        let inputs = list.metas("a");
        let retired: Vec<_> = inputs
            .iter()
            .map(|m| Arc::new(CompactedBlockMeta::new((**m).clone(), chrono::Utc::now())))
            .collect();
        list.update("a", &[Arc::new(BlockMeta::new("a", id(3)))], &inputs, &retired, &[]);

        // the backend still lists 1 and 2 as live
        poller.poll_and_apply(&list).await.unwrap();

        assert_eq!(list.metas("a").len(), 1);
        assert_eq!(gauge(&registry, "tempodb_blocklist_length", Some("a")), Some(1.0));
        assert_eq!(
            gauge(&registry, "tempodb_blocklist_compacted_length", Some("a")),
            Some(2.0)
        );
    }

    #[tokio::test]
    async fn test_update_survives_one_stale_poll() {
        let store = Arc::new(InMemory::new());
        put_live(&store, "a", 1).await;
        put_live(&store, "a", 2).await;

        let poller = poller(store.clone());
        let list = List::new();
        poller.poll_and_apply(&list).await.unwrap();
        assert_eq!(ids(&list.metas("a")), vec![1, 2]);

        // compaction merged 1 and 2 into 3; the backend listing has not caught up
        let merged = Arc::new(BlockMeta::new("a", id(3)));
        let compacted: Vec<_> = list
            .metas("a")
            .iter()
            .map(|m| Arc::new(CompactedBlockMeta::new((**m).clone(), chrono::Utc::now())))
            .collect();
        list.update("a", &[merged], &list.metas("a"), &compacted, &[]);
        assert_eq!(ids(&list.metas("a")), vec![3]);

        poller.poll_and_apply(&list).await.unwrap();
        assert_eq!(ids(&list.metas("a")), vec![3]);
        assert_eq!(ids(&list.compacted_metas("a")), vec![1, 2]);

        // the backend catches up
        put_live(&store, "a", 3).await;
        put_compacted(&store, "a", 1).await;
        put_compacted(&store, "a", 2).await;

        poller.poll_and_apply(&list).await.unwrap();
        assert_eq!(ids(&list.metas("a")), vec![3]);
        assert_eq!(ids(&list.compacted_metas("a")), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let store = Arc::new(InMemory::new());
        put_live(&store, "a", 1).await;

        let list = Arc::new(List::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let poller = poller(store);

        let handle = {
            let list = Arc::clone(&list);
            tokio::spawn(async move {
                poller
                    .run(list, Duration::from_millis(10), shutdown_rx)
                    .await
            })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while list.tenants().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("poller never applied a snapshot");

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop")
            .unwrap();

        assert_eq!(list.tenants(), vec!["a"]);
    }
}
