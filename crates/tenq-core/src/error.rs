use thiserror::Error;

use crate::api::TenantId;

/// Error returned by `submit_work`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The task's tenant is not provisioned. No scheduler state was mutated.
    #[error("unknown tenant: {0}")]
    UnknownTenant(TenantId),
    /// The manager was closed while submitting or while blocked on
    /// backpressure. The task was not enqueued.
    #[error("queue manager closed")]
    Closed,
}

/// Error returned by `take_work`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TakeError {
    /// The manager was closed while waiting for work.
    #[error("queue manager closed")]
    Closed,
}

/// Error returned by tenant lifecycle operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("tenant already provisioned: {0}")]
    AlreadyProvisioned(TenantId),
    #[error("unknown tenant: {0}")]
    UnknownTenant(TenantId),
    #[error("invalid tenant config: {0}")]
    InvalidConfig(&'static str),
}
