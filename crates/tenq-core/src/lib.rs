//! tenq-core — multi-tenant fair work queue.
//!
//! Admits tasks from many independent tenants into a shared worker pool
//! while guaranteeing per-tenant fairness and per-tenant backpressure:
//!
//! - Fairness: round-robin by tenant, not by task. Every tenant with
//!   pending work gets one dispatch opportunity before any tenant gets a
//!   second ([`SchedulingStrategy::FairQueueing`]), or `weight` opportunities
//!   per rotation under [`SchedulingStrategy::WeightedFairQueueing`]
//!   (deficit round robin).
//! - Backpressure: each tenant owns a bounded backlog; a full backlog
//!   suspends only that tenant's producers.
//! - A newly active tenant's first task enters the rotation immediately and
//!   never waits behind other tenants' backlogs.
//!
//! The core is synchronous and runtime-agnostic; a Tokio adapter lives in
//! `tenq-async`. Task execution is out of scope: consumers loop on
//! [`WorkQueueManager::take_work`] and run whatever comes back.

mod api;
mod error;
mod manager;
pub mod metrics;
mod registry;
mod scheduler;
mod state;

#[cfg(test)]
mod tests;

pub use api::{ManagerStats, SchedulingStrategy, TenantConfig, TenantId, TenantTask, Work};
pub use error::{ProvisionError, SubmitError, TakeError};
pub use manager::WorkQueueManager;
pub use scheduler::{FairQueueingScheduler, WeightedFairQueueingScheduler, WorkScheduler};
