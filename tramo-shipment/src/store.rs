use async_trait::async_trait;
use tramo_core::StoreResult;
use uuid::Uuid;

use crate::model::Shipment;
use crate::state::ShipmentState;

/// Persistence port for the shipment aggregate.
///
/// `put` is a versioned write: it inserts when `shipment.version` is 0,
/// otherwise replaces only while the stored version still matches, and
/// returns the new stored version. A mismatch is a `VersionConflict`.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Shipment>>;

    async fn get_by_tracking(
        &self,
        tenant_id: Uuid,
        tracking_code: &str,
    ) -> StoreResult<Option<Shipment>>;

    async fn put(&self, shipment: &Shipment) -> StoreResult<i64>;

    /// Shipments of one tenant currently in any of `states`. Reconciliation
    /// sweeps use this; listings stay tenant-scoped by construction.
    async fn list_by_states(
        &self,
        tenant_id: Uuid,
        states: &[ShipmentState],
    ) -> StoreResult<Vec<Shipment>>;
}
