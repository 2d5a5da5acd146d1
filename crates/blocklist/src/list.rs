use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use storage::{BlockMeta, CompactedBlockMeta};
use tracing::debug;
use uuid::Uuid;

/// Live blocks per tenant
pub type PerTenant = HashMap<String, Vec<Arc<BlockMeta>>>;

/// Compacted blocks per tenant
pub type PerTenantCompacted = HashMap<String, Vec<Arc<CompactedBlockMeta>>>;

/// Number of poll results an update is replayed onto unless configured otherwise
pub const DEFAULT_REPLAY_DEPTH: usize = 1;

/// List - the per-tenant catalog of live and compacted blocks
///
/// Two writers feed the list:
/// - the poller calls [`List::apply_poll_results`] with a full snapshot of the
///   backend, which becomes the new baseline
/// - compaction calls [`List::update`] with incremental changes, which are visible
///   immediately and are also kept as the tenant's pending update
///
/// Backend listings are eventually consistent, so a snapshot taken right after an
/// update may not contain it yet. The pending update is therefore replayed on top
/// of the next `replay_depth` snapshots and then dropped, after which the backend
/// is trusted again.
///
/// The known tenants are exactly the keys of the live map. A tenant that only has
/// compacted blocks is considered retired.
#[derive(Debug)]
pub struct List {
    inner: RwLock<Inner>,
    replay_depth: usize,
}

#[derive(Debug, Default)]
struct Inner {
    metas: PerTenant,
    compacted_metas: PerTenantCompacted,
    pending: HashMap<String, PendingUpdate>,
}

/// The most recent update of one tenant
#[derive(Debug)]
struct PendingUpdate {
    add: Vec<Arc<BlockMeta>>,
    remove: Vec<Arc<BlockMeta>>,
    compacted_add: Vec<Arc<CompactedBlockMeta>>,
    compacted_remove: Vec<Arc<CompactedBlockMeta>>,
    /// Poll results this update is still replayed onto
    remaining: usize,
}

impl PendingUpdate {
    fn touches_compacted(&self) -> bool {
        !self.compacted_add.is_empty() || !self.compacted_remove.is_empty()
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    pub fn new() -> Self {
        Self::with_replay_depth(DEFAULT_REPLAY_DEPTH)
    }

    /// Create a list whose updates survive `replay_depth` poll results.
    /// A depth of zero trusts every poll result as is.
    pub fn with_replay_depth(replay_depth: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            replay_depth,
        }
    }

    pub fn replay_depth(&self) -> usize {
        self.replay_depth
    }

    /// Tenants that currently have a live block entry, in no particular order
    pub fn tenants(&self) -> Vec<String> {
        self.inner.read().metas.keys().cloned().collect()
    }

    /// Tenants that currently have compacted blocks, in no particular order
    pub fn compacted_tenants(&self) -> Vec<String> {
        self.inner.read().compacted_metas.keys().cloned().collect()
    }

    /// Live blocks of a tenant, empty if the tenant is unknown
    pub fn metas(&self, tenant: &str) -> Vec<Arc<BlockMeta>> {
        self.inner
            .read()
            .metas
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }

    /// Compacted blocks of a tenant, empty if there are none
    pub fn compacted_metas(&self, tenant: &str) -> Vec<Arc<CompactedBlockMeta>> {
        self.inner
            .read()
            .compacted_metas
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the catalog with a fresh backend snapshot.
    ///
    /// Tenants missing from `metas` have no live blocks afterwards. Pending updates
    /// are replayed onto the tenants present in `metas`, and onto the compacted
    /// side of every tenant they touch, then their replay budget is decremented.
    pub fn apply_poll_results(&self, metas: PerTenant, compacted: PerTenantCompacted) {
        let mut inner = self.inner.write();
        let Inner {
            metas: current,
            compacted_metas: current_compacted,
            pending,
        } = &mut *inner;

        *current = metas;
        *current_compacted = compacted;

        let mut replayed = 0;
        for (tenant, update) in pending.iter() {
            if current.contains_key(tenant) {
                let blocked = compacted_ids(&update.compacted_add, &update.compacted_remove);
                merge_into(current, tenant, &update.add, &update.remove, &blocked);
                replayed += 1;
            }

            if update.touches_compacted() || current_compacted.contains_key(tenant) {
                merge_into(
                    current_compacted,
                    tenant,
                    &update.compacted_add,
                    &update.compacted_remove,
                    &HashSet::new(),
                );
            }
        }

        let pending_before = pending.len();
        pending.retain(|_, update| {
            update.remaining = update.remaining.saturating_sub(1);
            update.remaining > 0
        });

        debug!(
            tenants = current.len(),
            compacted_tenants = current_compacted.len(),
            replayed,
            expired = pending_before - pending.len(),
            "Applied poll results"
        );
    }

    /// Apply an incremental change for one tenant.
    ///
    /// - blocks in `remove` are dropped from the live list
    /// - blocks in `add` are appended unless already present, also removed, or
    ///   touched by `compacted_add` / `compacted_remove` in the same call
    /// - blocks in `compacted_remove` are dropped from the compacted list
    /// - blocks in `compacted_add` are appended unless already present or also removed
    ///
    /// Surviving blocks keep their order. The change replaces any pending update of
    /// the tenant and will be replayed onto the next poll result(s).
    pub fn update(
        &self,
        tenant: &str,
        add: &[Arc<BlockMeta>],
        remove: &[Arc<BlockMeta>],
        compacted_add: &[Arc<CompactedBlockMeta>],
        compacted_remove: &[Arc<CompactedBlockMeta>],
    ) {
        let blocked = compacted_ids(compacted_add, compacted_remove);

        let mut inner = self.inner.write();

        // Compaction-only changes must not make a tenant known
        if !add.is_empty() || !remove.is_empty() || inner.metas.contains_key(tenant) {
            merge_into(&mut inner.metas, tenant, add, remove, &blocked);
        }

        if !compacted_add.is_empty()
            || !compacted_remove.is_empty()
            || inner.compacted_metas.contains_key(tenant)
        {
            merge_into(
                &mut inner.compacted_metas,
                tenant,
                compacted_add,
                compacted_remove,
                &HashSet::new(),
            );
        }

        if self.replay_depth > 0 {
            inner.pending.insert(
                tenant.to_string(),
                PendingUpdate {
                    add: add.to_vec(),
                    remove: remove.to_vec(),
                    compacted_add: compacted_add.to_vec(),
                    compacted_remove: compacted_remove.to_vec(),
                    remaining: self.replay_depth,
                },
            );
        }

        debug!(
            tenant = %tenant,
            add = add.len(),
            remove = remove.len(),
            compacted_add = compacted_add.len(),
            compacted_remove = compacted_remove.len(),
            "Updated blocklist"
        );
    }
}

fn block_id<T: AsRef<BlockMeta>>(meta: &T) -> Uuid {
    meta.as_ref().block_id
}

fn compacted_ids(
    compacted_add: &[Arc<CompactedBlockMeta>],
    compacted_remove: &[Arc<CompactedBlockMeta>],
) -> HashSet<Uuid> {
    compacted_add
        .iter()
        .chain(compacted_remove)
        .map(|m| m.block_id())
        .collect()
}

fn merge_into<T: AsRef<BlockMeta>>(
    lists: &mut HashMap<String, Vec<Arc<T>>>,
    tenant: &str,
    add: &[Arc<T>],
    remove: &[Arc<T>],
    blocked: &HashSet<Uuid>,
) {
    let existing = lists.get(tenant).map(Vec::as_slice).unwrap_or_default();
    let merged = merge(existing, add, remove, blocked);
    lists.insert(tenant.to_string(), merged);
}

/// `existing - remove`, followed by the blocks of `add` that are new, not removed
/// and not blocked. IDs are unique in the result; the first occurrence wins.
fn merge<T: AsRef<BlockMeta>>(
    existing: &[Arc<T>],
    add: &[Arc<T>],
    remove: &[Arc<T>],
    blocked: &HashSet<Uuid>,
) -> Vec<Arc<T>> {
    let removed: HashSet<Uuid> = remove.iter().map(|m| block_id::<T>(m)).collect();

    let mut seen = HashSet::with_capacity(existing.len() + add.len());
    let mut merged = Vec::with_capacity(existing.len() + add.len());

    for meta in existing {
        let id = block_id::<T>(meta);
        if !removed.contains(&id) && seen.insert(id) {
            merged.push(Arc::clone(meta));
        }
    }

    for meta in add {
        let id = block_id::<T>(meta);
        if !removed.contains(&id) && !blocked.contains(&id) && seen.insert(id) {
            merged.push(Arc::clone(meta));
        }
    }

    merged
}
