use std::sync::Arc;

use dashmap::DashMap;

use crate::api::TenantId;
use crate::state::TenantBacklog;

/// Concurrency-safe map from tenant id to that tenant's bounded backlog.
///
/// Owned by the front-door manager and shared with the scheduler. Backlogs
/// are created at provisioning and destroyed at deprovisioning; lookups for
/// unknown tenants fail fast without touching any other tenant's state.
pub(crate) struct TenantRegistry<T> {
    backlogs: DashMap<TenantId, Arc<TenantBacklog<T>>>,
}

impl<T> TenantRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            backlogs: DashMap::new(),
        }
    }

    /// Registers a backlog for a new tenant. Fails if the id is taken.
    pub(crate) fn insert(&self, tenant: TenantId, capacity: usize) -> Result<(), crate::error::ProvisionError> {
        match self.backlogs.entry(tenant) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => Err(
                crate::error::ProvisionError::AlreadyProvisioned(occupied.key().clone()),
            ),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(TenantBacklog::new(capacity)));
                Ok(())
            }
        }
    }

    /// Removes and closes a tenant's backlog, returning the number of
    /// backlog tasks discarded. `None` if the tenant was not provisioned.
    pub(crate) fn remove(&self, tenant: &TenantId) -> Option<usize> {
        let (_, backlog) = self.backlogs.remove(tenant)?;
        Some(backlog.close())
    }

    /// Returns the tenant's backlog as an owned handle. The handle is cloned
    /// out so no map shard lock is held across blocking backlog operations.
    pub(crate) fn get(&self, tenant: &TenantId) -> Option<Arc<TenantBacklog<T>>> {
        self.backlogs
            .get(tenant)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn contains(&self, tenant: &TenantId) -> bool {
        self.backlogs.contains_key(tenant)
    }

    /// Approximate total backlog depth across tenants, for stats only.
    pub(crate) fn backlog_len_estimate(&self) -> u64 {
        self.backlogs
            .iter()
            .map(|entry| entry.value().len() as u64)
            .sum()
    }

    /// Closes every backlog, waking all producers blocked on backpressure.
    pub(crate) fn close_all(&self) {
        for entry in self.backlogs.iter() {
            entry.value().close();
        }
    }
}
