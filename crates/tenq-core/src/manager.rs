use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{ManagerStats, SchedulingStrategy, TenantConfig, TenantId, TenantTask};
use crate::error::{ProvisionError, SubmitError, TakeError};
use crate::registry::TenantRegistry;
use crate::scheduler::{make_scheduler, WorkScheduler};
use crate::state::Counters;

/// Front door of the multi-tenant work queue.
///
/// Validates tenant identity, owns the tenant registry and lifecycle, and
/// forwards submissions and retrievals to the configured scheduling
/// strategy. Producers call [`submit_work`](WorkQueueManager::submit_work);
/// worker-side consumers loop on [`take_work`](WorkQueueManager::take_work)
/// and execute whatever comes back.
///
/// All operations are safe to call concurrently, including tenant
/// provisioning against a live system. A submit racing a concurrent
/// provision or deprovision of the same tenant may observe either side of
/// the transition; a submit strictly after a completed deprovision always
/// fails with [`SubmitError::UnknownTenant`].
pub struct WorkQueueManager<T> {
    registry: Arc<TenantRegistry<TenantTask<T>>>,
    scheduler: Box<dyn WorkScheduler<T>>,
    counters: Counters,
}

impl<T: Send + 'static> WorkQueueManager<T> {
    /// Builds a manager serving the given tenants under the given strategy.
    pub fn new(
        tenant_configs: Vec<TenantConfig>,
        strategy: SchedulingStrategy,
    ) -> Result<Self, ProvisionError> {
        let registry = Arc::new(TenantRegistry::new());
        let scheduler = make_scheduler(strategy, Arc::clone(&registry));
        let manager = Self {
            registry,
            scheduler,
            counters: Counters::new(),
        };
        for config in tenant_configs {
            manager.provision_tenant(config)?;
        }
        debug!(strategy = ?strategy, tenants = manager.tenant_count(), "queue manager initialized");
        Ok(manager)
    }

    /// Submits a task for its tenant.
    ///
    /// Fails fast with [`SubmitError::UnknownTenant`] when the tenant is not
    /// provisioned, without mutating any scheduler state. Otherwise the call
    /// may block for backpressure until the tenant's backlog has space; a
    /// blocked call is woken by [`close`](WorkQueueManager::close) or by the
    /// tenant's deprovisioning.
    pub fn submit_work(&self, task: TenantTask<T>) -> Result<(), SubmitError> {
        if !self.registry.contains(&task.tenant) {
            self.counters.rejected_unknown.fetch_add(1, Ordering::Relaxed);
            warn!(tenant = %task.tenant, "submit rejected: unknown tenant");
            return Err(SubmitError::UnknownTenant(task.tenant));
        }
        self.scheduler.add(task)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Retrieves the next task per the scheduling strategy, blocking until
    /// one is available or the manager closes.
    pub fn take_work(&self) -> Result<TenantTask<T>, TakeError> {
        let task = self.scheduler.remove()?;
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        Ok(task)
    }

    /// Like [`take_work`](WorkQueueManager::take_work) but returns
    /// `Ok(None)` when no task shows up within `timeout`.
    pub fn take_work_timeout(&self, timeout: Duration) -> Result<Option<TenantTask<T>>, TakeError> {
        match self.scheduler.remove_timeout(timeout)? {
            Some(task) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Provisions a new tenant: creates its bounded backlog and registers it
    /// with the scheduler. Safe while other tenants are submitting and
    /// consuming.
    pub fn provision_tenant(&self, config: TenantConfig) -> Result<(), ProvisionError> {
        config.validate()?;
        let capacity = self.scheduler.effective_capacity(config.work_capacity);
        self.registry.insert(config.tenant_id.clone(), capacity)?;
        self.scheduler.provision_tenant(&config);
        self.counters.tenants.fetch_add(1, Ordering::Relaxed);
        debug!(
            tenant = %config.tenant_id,
            name = %config.display_name,
            capacity,
            weight = config.weight,
            "tenant provisioned"
        );
        Ok(())
    }

    /// Deprovisions a tenant, discarding its backlog immediately.
    ///
    /// Returns the number of backlog tasks discarded. Tasks the tenant
    /// already holds in the dispatch path may still be delivered; exact-once
    /// delivery during deprovisioning is explicitly not guaranteed.
    pub fn deprovision_tenant(&self, tenant: &TenantId) -> Result<usize, ProvisionError> {
        let Some(dropped) = self.registry.remove(tenant) else {
            return Err(ProvisionError::UnknownTenant(tenant.clone()));
        };
        self.scheduler.deprovision_tenant(tenant);
        self.counters.tenants.fetch_sub(1, Ordering::Relaxed);
        debug!(tenant = %tenant, dropped, "tenant deprovisioned, backlog discarded");
        Ok(dropped)
    }

    /// Adjusts a tenant's weighted-fair-queueing weight on a live system.
    /// No effect under plain fair queueing.
    pub fn set_tenant_weight(&self, tenant: &TenantId, weight: u32) -> Result<(), ProvisionError> {
        if !self.registry.contains(tenant) {
            return Err(ProvisionError::UnknownTenant(tenant.clone()));
        }
        self.scheduler.set_weight(tenant, weight);
        Ok(())
    }

    /// Current number of provisioned tenants. Lock-free read.
    pub fn tenant_count(&self) -> usize {
        self.counters.tenants.load(Ordering::Relaxed)
    }

    /// Total tasks handed out so far. Lock-free read.
    pub fn processed_count(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    /// Counter snapshot for observability. Never used for scheduling.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            tenants: self.counters.tenants.load(Ordering::Relaxed),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            rejected_unknown_tenant: self.counters.rejected_unknown.load(Ordering::Relaxed),
            backlog_len_estimate: self.registry.backlog_len_estimate(),
        }
    }

    /// Cooperative cancellation: wakes every producer blocked on
    /// backpressure and every consumer blocked on an empty system; all of
    /// them return `Closed`. Each interrupted operation either fully
    /// completed before the close or did not happen at all.
    pub fn close(&self) {
        self.scheduler.close();
        self.registry.close_all();
        debug!("queue manager closed");
    }
}
