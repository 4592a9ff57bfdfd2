use std::fmt;

/// Stable identifier for a tenant served by the queue manager.
///
/// Equality and hashing are by the underlying id string; the id is expected
/// to be unique across tenants and immutable for the tenant's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for one tenant, supplied at provisioning time.
///
/// - `work_capacity` bounds how much work the tenant may hold inside the
///   manager at once. The scheduling strategy decides how much of it is
///   usable as backlog (see `WorkScheduler::effective_capacity`).
/// - `weight` only matters under weighted fair queueing; it defaults to 1
///   and is the only field that may change after provisioning.
#[derive(Clone, Debug)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    pub display_name: String,
    pub weight: u32,
    pub work_capacity: usize,
}

impl TenantConfig {
    pub fn new(tenant_id: impl Into<TenantId>, display_name: impl Into<String>, work_capacity: usize) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            display_name: display_name.into(),
            weight: 1,
            work_capacity,
        }
    }

    /// Sets the weighted-fair-queueing weight. Clamped to at least 1.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::ProvisionError> {
        if self.tenant_id.as_str().is_empty() {
            return Err(crate::error::ProvisionError::InvalidConfig("tenant id must not be empty"));
        }
        if self.work_capacity == 0 {
            return Err(crate::error::ProvisionError::InvalidConfig("work capacity must be at least 1"));
        }
        if self.weight == 0 {
            return Err(crate::error::ProvisionError::InvalidConfig("weight must be at least 1"));
        }
        Ok(())
    }
}

impl PartialEq for TenantConfig {
    fn eq(&self, other: &Self) -> bool {
        self.tenant_id == other.tenant_id && self.display_name == other.display_name
    }
}

impl Eq for TenantConfig {}

/// Scheduling strategy employed by the queue manager to order tenant tasks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Each active tenant gets one dispatch opportunity per rotation,
    /// independent of backlog depth.
    #[default]
    FairQueueing,
    /// Each active tenant gets up to `weight` dispatch opportunities per
    /// rotation (deficit round robin).
    WeightedFairQueueing,
}

/// A unit of work paired with the tenant that submitted it.
///
/// The core never looks inside the payload; it routes on the tenant id only.
#[derive(Clone, Debug)]
pub struct TenantTask<T> {
    pub tenant: TenantId,
    pub task: T,
}

impl<T> TenantTask<T> {
    pub fn new(tenant: impl Into<TenantId>, task: T) -> Self {
        Self {
            tenant: tenant.into(),
            task,
        }
    }

    /// Discards the tenant association and returns the payload.
    pub fn into_task(self) -> T {
        self.task
    }
}

impl<T: PartialEq> PartialEq for TenantTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.tenant == other.tenant && self.task == other.task
    }
}

impl<T: Eq> Eq for TenantTask<T> {}

impl<T: Work> fmt::Display for TenantTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant: {}, {}", self.tenant, self.task.description())
    }
}

/// Contract for executable work payloads.
///
/// This is the collaborator boundary: workers call [`Work::run`] after a
/// successful take, and whatever happens in there is the task's own concern.
/// The scheduling core itself never invokes it.
pub trait Work: Send {
    /// Executes the task. Nothing is observable to the queue manager.
    fn run(&self);

    /// Opaque description used only for diagnostics.
    fn description(&self) -> &str;
}

impl Work for Box<dyn Work> {
    fn run(&self) {
        self.as_ref().run();
    }

    fn description(&self) -> &str {
        self.as_ref().description()
    }
}

/// Point-in-time snapshot of the manager's observability counters.
///
/// These values are never consulted for scheduling decisions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Tenants currently provisioned.
    pub tenants: usize,
    /// Tasks accepted by `submit_work`.
    pub submitted: u64,
    /// Tasks handed out by `take_work`.
    pub processed: u64,
    /// Submissions rejected because the tenant was not provisioned.
    pub rejected_unknown_tenant: u64,
    /// Approximate number of tasks sitting in tenant backlogs.
    pub backlog_len_estimate: u64,
}
