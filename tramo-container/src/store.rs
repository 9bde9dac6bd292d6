use async_trait::async_trait;
use tramo_core::StoreResult;
use tramo_shipment::{ItemCondition, Shipment};
use uuid::Uuid;

use crate::model::{Container, ShipmentSummary};

/// What happened to a single mark-item request. Everything except
/// `Applied` left the stores untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkItemOutcome {
    Applied(MarkSummary),
    AlreadyVerified,
    ContainerNotOpen,
    ShipmentNotInContainer,
    ItemUnknown,
    /// The counters moved between read and write; the scanner should retry.
    CounterConflict,
}

/// Counter positions after a successful mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkSummary {
    pub shipment_marked: u32,
    pub shipment_total: u32,
    pub container_marked: u32,
    pub container_total: u32,
}

impl MarkSummary {
    pub fn container_fully_verified(&self) -> bool {
        self.container_marked == self.container_total
    }
}

/// Persistence port for containers.
///
/// `put` follows the versioned-write contract. `put_with_shipments`
/// commits the container and the given shipments in one transaction, all
/// version checks included, so cascades land whole or not at all.
#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Container>>;

    async fn put(&self, container: &Container) -> StoreResult<i64>;

    async fn put_with_shipments(
        &self,
        container: &Container,
        shipments: &[Shipment],
    ) -> StoreResult<()>;

    /// Atomically verify one item: flip the item flag (with any damage
    /// noted at the scan) and bump the shipment and container counters in
    /// a single commit. Concurrent scanners marking different items of the
    /// same container must both succeed; this is a counter increment, not
    /// a document swap.
    async fn mark_item(
        &self,
        tenant_id: Uuid,
        container_id: Uuid,
        shipment_id: Uuid,
        item_id: Uuid,
        condition: ItemCondition,
    ) -> StoreResult<MarkItemOutcome>;

    /// Overwrite one membership row's counters with canonical values
    /// taken from the shipment document. Reconciliation only.
    async fn repair_summary(
        &self,
        tenant_id: Uuid,
        container_id: Uuid,
        summary: &ShipmentSummary,
    ) -> StoreResult<()>;
}
