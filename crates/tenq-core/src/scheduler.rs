use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::api::{SchedulingStrategy, TenantConfig, TenantId, TenantTask};
use crate::error::{SubmitError, TakeError};
use crate::registry::TenantRegistry;
use crate::state::{PromoteOutcome, RouteOutcome, WeightedTake, WorkSignal};

/// Fairness discipline behind the front-door manager.
///
/// Implementations decide, among many tenants each holding a backlog, which
/// task a consumer receives next. Both `add` and `remove` may block; a
/// blocked call is woken by `close` and then reports `Closed` without
/// leaving any half-applied state behind.
pub trait WorkScheduler<T>: Send + Sync {
    /// Schedules a task. Blocks the caller only when the task's own tenant
    /// backlog is at capacity.
    fn add(&self, task: TenantTask<T>) -> Result<(), SubmitError>;

    /// Retrieves the next task per the fairness discipline, blocking until
    /// some tenant has a dispatchable task.
    fn remove(&self) -> Result<TenantTask<T>, TakeError>;

    /// Like [`WorkScheduler::remove`], but gives up after `timeout` and
    /// returns `Ok(None)`.
    fn remove_timeout(&self, timeout: Duration) -> Result<Option<TenantTask<T>>, TakeError>;

    /// Registers scheduling state for a new tenant. Backlog storage lives in
    /// the registry, so most disciplines need little or nothing here.
    fn provision_tenant(&self, _config: &TenantConfig) {}

    /// Drops scheduling state for a tenant.
    fn deprovision_tenant(&self, _tenant: &TenantId) {}

    /// Adjusts a tenant's share of dispatch opportunities per rotation.
    /// Meaningless outside weighted scheduling.
    fn set_weight(&self, _tenant: &TenantId, _weight: u32) {}

    /// Usable backlog capacity for a configured `work_capacity` under this
    /// discipline.
    fn effective_capacity(&self, work_capacity: usize) -> usize {
        work_capacity
    }

    /// Wakes every blocked `add`/`remove`; they return `Closed`.
    fn close(&self);
}

pub(crate) fn make_scheduler<T: Send + 'static>(
    strategy: SchedulingStrategy,
    registry: Arc<TenantRegistry<TenantTask<T>>>,
) -> Box<dyn WorkScheduler<T>> {
    match strategy {
        SchedulingStrategy::FairQueueing => Box::new(FairQueueingScheduler::new(registry)),
        SchedulingStrategy::WeightedFairQueueing => {
            Box::new(WeightedFairQueueingScheduler::new(registry))
        }
    }
}

/// Round-robin-by-tenant scheduler.
///
/// One shared dispatch queue holds at most one task per active tenant; the
/// rest of a tenant's work waits in its own bounded backlog. Admission and
/// dispatch are O(1):
///
/// - `add` flips the tenant's idle flag; on an idle-to-busy transition the
///   task goes straight into the dispatch queue, otherwise it queues behind
///   the tenant's representative.
/// - `remove` pops the dispatch queue, then promotes the tenant's next
///   backlog task to keep its rotation slot, or marks the tenant idle.
///
/// A tenant's rotation position is fixed by when it turned busy; a drained
/// tenant re-enters at the back. A freshly provisioned tenant's first task
/// is therefore never stuck behind other tenants' backlogs.
pub struct FairQueueingScheduler<T> {
    registry: Arc<TenantRegistry<TenantTask<T>>>,
    dispatch: Mutex<VecDeque<TenantTask<T>>>,
    signal: WorkSignal,
    closed: AtomicBool,
}

impl<T> FairQueueingScheduler<T> {
    pub(crate) fn new(registry: Arc<TenantRegistry<TenantTask<T>>>) -> Self {
        Self {
            registry,
            // Unbounded: bounding by tenant count would fight provisioning.
            dispatch: Mutex::new(VecDeque::new()),
            signal: WorkSignal::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn next_ready(&self) -> Option<TenantTask<T>> {
        let task = self.dispatch.lock().pop_front()?;
        // Promote the dispatched tenant's next backlog task, if any. A
        // deprovisioned tenant has no backlog left; its in-flight dispatch
        // entry is still delivered.
        if let Some(backlog) = self.registry.get(&task.tenant) {
            match backlog.promote() {
                PromoteOutcome::Next(next) => {
                    self.dispatch.lock().push_back(next);
                    self.signal.notify_all();
                }
                PromoteOutcome::Idle => {}
            }
        }
        Some(task)
    }
}

impl<T: Send> WorkScheduler<T> for FairQueueingScheduler<T> {
    fn add(&self, task: TenantTask<T>) -> Result<(), SubmitError> {
        let Some(backlog) = self.registry.get(&task.tenant) else {
            return Err(SubmitError::UnknownTenant(task.tenant));
        };
        match backlog.route(task) {
            RouteOutcome::Activated(task) => {
                self.dispatch.lock().push_back(task);
                self.signal.notify_all();
                Ok(())
            }
            RouteOutcome::Queued => Ok(()),
            RouteOutcome::Closed(task) => {
                if self.closed.load(Ordering::Acquire) {
                    Err(SubmitError::Closed)
                } else {
                    // The tenant was deprovisioned out from under the call.
                    Err(SubmitError::UnknownTenant(task.tenant))
                }
            }
        }
    }

    fn remove(&self) -> Result<TenantTask<T>, TakeError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            let observed = self.signal.current();
            if let Some(task) = self.next_ready() {
                return Ok(task);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            self.signal.wait_for_change(observed);
        }
    }

    fn remove_timeout(&self, timeout: Duration) -> Result<Option<TenantTask<T>>, TakeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            let observed = self.signal.current();
            if let Some(task) = self.next_ready() {
                return Ok(Some(task));
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.signal.wait_for_change_timeout(observed, deadline - now);
        }
    }

    /// One backlog slot is traded for the tenant's representative slot in
    /// the dispatch queue, floored so a capacity of 1 still admits work.
    fn effective_capacity(&self, work_capacity: usize) -> usize {
        work_capacity.saturating_sub(1).max(1)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.signal.notify_all();
        }
    }
}

const DEFAULT_WEIGHT: u32 = 1;

struct TenantShare {
    weight: u32,
    /// Remaining dispatch opportunities in the current rotation. Refilled
    /// from `weight` when the tenant's turn comes up with zero credit.
    credit: u32,
}

impl TenantShare {
    fn new(weight: u32) -> Self {
        Self {
            weight: weight.max(1),
            credit: 0,
        }
    }
}

struct RoundState {
    /// Active tenants in rotation order.
    ring: VecDeque<TenantId>,
    shares: HashMap<TenantId, TenantShare>,
}

/// Deficit-round-robin scheduler: a tenant with weight `w` is entitled to up
/// to `w` consecutive dispatches per rotation.
///
/// Tasks always land in the tenant backlog; the rotation ring orders active
/// tenants. The head tenant keeps its turn until its credit or backlog runs
/// out, then rotates to the back. Any tenant with pending work is served
/// within one full rotation, so no weight assignment can starve another
/// tenant.
pub struct WeightedFairQueueingScheduler<T> {
    registry: Arc<TenantRegistry<TenantTask<T>>>,
    round: Mutex<RoundState>,
    signal: WorkSignal,
    closed: AtomicBool,
}

impl<T> WeightedFairQueueingScheduler<T> {
    pub(crate) fn new(registry: Arc<TenantRegistry<TenantTask<T>>>) -> Self {
        Self {
            registry,
            round: Mutex::new(RoundState {
                ring: VecDeque::new(),
                shares: HashMap::new(),
            }),
            signal: WorkSignal::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn next_ready(&self) -> Option<TenantTask<T>> {
        let mut round = self.round.lock();
        let round = &mut *round;
        // One pass over the ring at most; stale entries are dropped as they
        // are encountered.
        for _ in 0..round.ring.len() {
            let Some(tenant) = round.ring.pop_front() else {
                break;
            };
            let Some(backlog) = self.registry.get(&tenant) else {
                round.shares.remove(&tenant);
                continue;
            };
            match backlog.take_front() {
                WeightedTake::Taken { task, drained } => {
                    let share = round
                        .shares
                        .entry(tenant.clone())
                        .or_insert_with(|| TenantShare::new(DEFAULT_WEIGHT));
                    if share.credit == 0 {
                        share.credit = share.weight.max(1);
                    }
                    share.credit -= 1;
                    if drained {
                        // Leaves the ring; credit does not carry across an
                        // idle period.
                        share.credit = 0;
                    } else if share.credit > 0 {
                        round.ring.push_front(tenant);
                    } else {
                        round.ring.push_back(tenant);
                    }
                    return Some(task);
                }
                WeightedTake::Empty => continue,
            }
        }
        None
    }
}

impl<T: Send> WorkScheduler<T> for WeightedFairQueueingScheduler<T> {
    fn add(&self, task: TenantTask<T>) -> Result<(), SubmitError> {
        let Some(backlog) = self.registry.get(&task.tenant) else {
            return Err(SubmitError::UnknownTenant(task.tenant));
        };
        let tenant = task.tenant.clone();
        match backlog.put_and_activate(task) {
            Ok(true) => {
                let mut round = self.round.lock();
                round
                    .shares
                    .entry(tenant.clone())
                    .or_insert_with(|| TenantShare::new(DEFAULT_WEIGHT));
                round.ring.push_back(tenant);
                drop(round);
                self.signal.notify_all();
                Ok(())
            }
            // Already in rotation; a waiting consumer will find the task on
            // its next ring pass.
            Ok(false) => Ok(()),
            Err(task) => {
                if self.closed.load(Ordering::Acquire) {
                    Err(SubmitError::Closed)
                } else {
                    Err(SubmitError::UnknownTenant(task.tenant))
                }
            }
        }
    }

    fn remove(&self) -> Result<TenantTask<T>, TakeError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            let observed = self.signal.current();
            if let Some(task) = self.next_ready() {
                return Ok(task);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            self.signal.wait_for_change(observed);
        }
    }

    fn remove_timeout(&self, timeout: Duration) -> Result<Option<TenantTask<T>>, TakeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            let observed = self.signal.current();
            if let Some(task) = self.next_ready() {
                return Ok(Some(task));
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(TakeError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.signal.wait_for_change_timeout(observed, deadline - now);
        }
    }

    fn provision_tenant(&self, config: &TenantConfig) {
        let mut round = self.round.lock();
        round
            .shares
            .insert(config.tenant_id.clone(), TenantShare::new(config.weight));
    }

    fn deprovision_tenant(&self, tenant: &TenantId) {
        let mut round = self.round.lock();
        round.shares.remove(tenant);
        round.ring.retain(|entry| entry != tenant);
    }

    fn set_weight(&self, tenant: &TenantId, weight: u32) {
        let mut round = self.round.lock();
        if let Some(share) = round.shares.get_mut(tenant) {
            share.weight = weight.max(1);
            share.credit = share.credit.min(share.weight);
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.signal.notify_all();
        }
    }
}
