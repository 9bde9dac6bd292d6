pub mod directory;
pub mod notify;
pub mod policy;
pub mod sequence;

use uuid::Uuid;

/// The error taxonomy every service surfaces.
///
/// Transitions either commit together with their aggregate side effects or
/// fail with one of these without touching anything.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("sequence {series} for tenant {tenant_id} still contended after {attempts} attempts")]
    SequenceConflict {
        series: String,
        tenant_id: Uuid,
        attempts: u32,
    },

    #[error("illegal transition: {event} is not allowed from {from}")]
    StateTransition { from: String, event: String },

    #[error("route {route_id} still has {pending} shipments awaiting a delivery outcome")]
    PendingDeliveries { route_id: Uuid, pending: usize },

    #[error("aggregate mismatch: {0}")]
    Consistency(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures raised by the transactional store ports.
///
/// `VersionConflict` is the optimistic-concurrency signal; everything else
/// is infrastructure. Ports that treat contention as an expected outcome
/// (sequence writes, the route finalize CAS) return `bool` instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict writing {entity} {id}")]
    VersionConflict { entity: &'static str, id: String },

    #[error("{entity} {id} is not stored")]
    Missing { entity: &'static str, id: String },

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
