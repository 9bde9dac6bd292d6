use async_trait::async_trait;
use tramo_core::StoreResult;
use tramo_shipment::Shipment;
use uuid::Uuid;

use crate::model::Route;

/// Persistence port for routes.
///
/// `put` follows the versioned-write contract; `put_with_shipments`
/// commits the route and the given shipments in one transaction.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Route>>;

    async fn put(&self, route: &Route) -> StoreResult<i64>;

    async fn put_with_shipments(
        &self,
        route: &Route,
        shipments: &[Shipment],
    ) -> StoreResult<()>;

    /// Close-out compare-and-swap: commit `route` (carrying its embedded
    /// settlement) only while the stored row still has `route.version` and
    /// is still in delivery. `Ok(false)` means a concurrent writer got
    /// there first; the caller re-reads and decides.
    async fn finalize(&self, route: &Route) -> StoreResult<bool>;
}
