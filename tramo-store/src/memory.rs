//! In-memory store backend.
//!
//! One mutex over all the maps keeps every multi-document commit atomic,
//! so this backend has the same commit semantics as the Postgres one.
//! Tests and single-node trials run against it directly.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tramo_container::model::{Container, ContainerState, ShipmentSummary};
use tramo_container::store::{ContainerStore, MarkItemOutcome, MarkSummary};
use tramo_core::sequence::{SequenceCounter, SequenceStore};
use tramo_core::{StoreError, StoreResult};
use tramo_route::model::{Route, RouteState};
use tramo_route::store::RouteStore;
use tramo_shipment::model::{ItemCondition, ItemVerification, Shipment};
use tramo_shipment::state::ShipmentState;
use tramo_shipment::store::ShipmentStore;
use uuid::Uuid;

type Key = (Uuid, Uuid);

#[derive(Default)]
struct MemoryInner {
    shipments: HashMap<Key, Shipment>,
    containers: HashMap<Key, Container>,
    routes: HashMap<Key, Route>,
    sequences: HashMap<(Uuid, String), SequenceCounter>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_shipment(inner: &MemoryInner, shipment: &Shipment) -> StoreResult<()> {
    let stored = inner
        .shipments
        .get(&(shipment.tenant_id, shipment.id))
        .map(|s| s.version)
        .unwrap_or(0);
    if stored != shipment.version {
        return Err(StoreError::VersionConflict {
            entity: "shipment",
            id: shipment.id.to_string(),
        });
    }
    if shipment.version == 0
        && inner.shipments.values().any(|s| {
            s.tenant_id == shipment.tenant_id && s.tracking_code == shipment.tracking_code
        })
    {
        return Err(StoreError::Duplicate(format!(
            "tracking code {}",
            shipment.tracking_code
        )));
    }
    Ok(())
}

fn commit_shipment(inner: &mut MemoryInner, shipment: &Shipment) -> i64 {
    let mut copy = shipment.clone();
    copy.version += 1;
    let version = copy.version;
    inner.shipments.insert((shipment.tenant_id, shipment.id), copy);
    version
}

fn check_container(inner: &MemoryInner, container: &Container) -> StoreResult<()> {
    let stored = inner
        .containers
        .get(&(container.tenant_id, container.id))
        .map(|c| c.version)
        .unwrap_or(0);
    if stored != container.version {
        return Err(StoreError::VersionConflict {
            entity: "container",
            id: container.id.to_string(),
        });
    }
    if container.version == 0
        && inner
            .containers
            .values()
            .any(|c| c.tenant_id == container.tenant_id && c.number == container.number)
    {
        return Err(StoreError::Duplicate(format!(
            "container number {}",
            container.number
        )));
    }
    Ok(())
}

fn commit_container(inner: &mut MemoryInner, container: &Container) -> i64 {
    let mut copy = container.clone();
    copy.version += 1;
    let version = copy.version;
    inner
        .containers
        .insert((container.tenant_id, container.id), copy);
    version
}

fn check_route(inner: &MemoryInner, route: &Route) -> StoreResult<()> {
    let stored = inner
        .routes
        .get(&(route.tenant_id, route.id))
        .map(|r| r.version)
        .unwrap_or(0);
    if stored != route.version {
        return Err(StoreError::VersionConflict {
            entity: "route",
            id: route.id.to_string(),
        });
    }
    if route.version == 0
        && inner
            .routes
            .values()
            .any(|r| r.tenant_id == route.tenant_id && r.manifest_number == route.manifest_number)
    {
        return Err(StoreError::Duplicate(format!(
            "manifest number {}",
            route.manifest_number
        )));
    }
    Ok(())
}

fn commit_route(inner: &mut MemoryInner, route: &Route) -> i64 {
    let mut copy = route.clone();
    copy.version += 1;
    let version = copy.version;
    inner.routes.insert((route.tenant_id, route.id), copy);
    version
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Shipment>> {
        Ok(self.inner.lock().await.shipments.get(&(tenant_id, id)).cloned())
    }

    async fn get_by_tracking(
        &self,
        tenant_id: Uuid,
        tracking_code: &str,
    ) -> StoreResult<Option<Shipment>> {
        Ok(self
            .inner
            .lock()
            .await
            .shipments
            .values()
            .find(|s| s.tenant_id == tenant_id && s.tracking_code == tracking_code)
            .cloned())
    }

    async fn put(&self, shipment: &Shipment) -> StoreResult<i64> {
        let mut inner = self.inner.lock().await;
        check_shipment(&inner, shipment)?;
        Ok(commit_shipment(&mut inner, shipment))
    }

    async fn list_by_states(
        &self,
        tenant_id: Uuid,
        states: &[ShipmentState],
    ) -> StoreResult<Vec<Shipment>> {
        Ok(self
            .inner
            .lock()
            .await
            .shipments
            .values()
            .filter(|s| s.tenant_id == tenant_id && states.contains(&s.state()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContainerStore for MemoryStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Container>> {
        Ok(self
            .inner
            .lock()
            .await
            .containers
            .get(&(tenant_id, id))
            .cloned())
    }

    async fn put(&self, container: &Container) -> StoreResult<i64> {
        let mut inner = self.inner.lock().await;
        check_container(&inner, container)?;
        Ok(commit_container(&mut inner, container))
    }

    async fn put_with_shipments(
        &self,
        container: &Container,
        shipments: &[Shipment],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        check_container(&inner, container)?;
        for shipment in shipments {
            check_shipment(&inner, shipment)?;
        }
        commit_container(&mut inner, container);
        for shipment in shipments {
            commit_shipment(&mut inner, shipment);
        }
        Ok(())
    }

    async fn mark_item(
        &self,
        tenant_id: Uuid,
        container_id: Uuid,
        shipment_id: Uuid,
        item_id: Uuid,
        condition: ItemCondition,
    ) -> StoreResult<MarkItemOutcome> {
        let mut inner = self.inner.lock().await;

        let mut container = match inner.containers.get(&(tenant_id, container_id)) {
            Some(c) => c.clone(),
            None => {
                return Err(StoreError::Missing {
                    entity: "container",
                    id: container_id.to_string(),
                })
            }
        };
        if container.state != ContainerState::Open {
            return Ok(MarkItemOutcome::ContainerNotOpen);
        }
        if !container.has_shipment(shipment_id) {
            return Ok(MarkItemOutcome::ShipmentNotInContainer);
        }

        let mut shipment = match inner.shipments.get(&(tenant_id, shipment_id)) {
            Some(s) => s.clone(),
            None => {
                return Err(StoreError::Missing {
                    entity: "shipment",
                    id: shipment_id.to_string(),
                })
            }
        };
        match shipment.verify_item(item_id, condition) {
            ItemVerification::Unknown => return Ok(MarkItemOutcome::ItemUnknown),
            ItemVerification::AlreadyVerified => return Ok(MarkItemOutcome::AlreadyVerified),
            ItemVerification::Applied => {}
        }

        let (shipment_marked, shipment_total) = match container.summary_mut(shipment_id) {
            Some(summary) if summary.marked_items < summary.total_items => {
                summary.marked_items += 1;
                (summary.marked_items, summary.total_items)
            }
            Some(_) => return Ok(MarkItemOutcome::CounterConflict),
            None => return Ok(MarkItemOutcome::ShipmentNotInContainer),
        };

        shipment.version += 1;
        shipment.updated_at = Utc::now();
        container.version += 1;
        container.updated_at = Utc::now();

        let summary = MarkSummary {
            shipment_marked,
            shipment_total,
            container_marked: container.marked_items(),
            container_total: container.total_items(),
        };
        inner.shipments.insert((tenant_id, shipment_id), shipment);
        inner.containers.insert((tenant_id, container_id), container);
        Ok(MarkItemOutcome::Applied(summary))
    }

    async fn repair_summary(
        &self,
        tenant_id: Uuid,
        container_id: Uuid,
        summary: &ShipmentSummary,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let container = match inner.containers.get_mut(&(tenant_id, container_id)) {
            Some(c) => c,
            None => {
                return Err(StoreError::Missing {
                    entity: "container",
                    id: container_id.to_string(),
                })
            }
        };
        if let Some(stored) = container.summary_mut(summary.shipment_id) {
            stored.total_items = summary.total_items;
            stored.marked_items = summary.marked_items;
            container.version += 1;
            container.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> StoreResult<Option<Route>> {
        Ok(self.inner.lock().await.routes.get(&(tenant_id, id)).cloned())
    }

    async fn put(&self, route: &Route) -> StoreResult<i64> {
        let mut inner = self.inner.lock().await;
        check_route(&inner, route)?;
        Ok(commit_route(&mut inner, route))
    }

    async fn put_with_shipments(
        &self,
        route: &Route,
        shipments: &[Shipment],
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        check_route(&inner, route)?;
        for shipment in shipments {
            check_shipment(&inner, shipment)?;
        }
        commit_route(&mut inner, route);
        for shipment in shipments {
            commit_shipment(&mut inner, shipment);
        }
        Ok(())
    }

    async fn finalize(&self, route: &Route) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let stored = match inner.routes.get(&(route.tenant_id, route.id)) {
            Some(r) => r,
            None => {
                return Err(StoreError::Missing {
                    entity: "route",
                    id: route.id.to_string(),
                })
            }
        };
        if stored.version != route.version || stored.state != RouteState::InDelivery {
            return Ok(false);
        }
        commit_route(&mut inner, route);
        Ok(true)
    }
}

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn read(&self, tenant_id: Uuid, key: &str) -> StoreResult<SequenceCounter> {
        Ok(self
            .inner
            .lock()
            .await
            .sequences
            .get(&(tenant_id, key.to_string()))
            .copied()
            .unwrap_or_default())
    }

    async fn write(
        &self,
        tenant_id: Uuid,
        key: &str,
        value: i64,
        expected_version: i64,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .sequences
            .entry((tenant_id, key.to_string()))
            .or_insert_with(SequenceCounter::default);
        if entry.version != expected_version {
            return Ok(false);
        }
        entry.value = value;
        entry.version += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use tramo_shipment::model::Recipient;
    use tramo_shared::pii::Masked;

    use super::*;

    fn shipment_with_items(tenant_id: Uuid, n: usize) -> Shipment {
        let recipient = Recipient {
            name: Masked::new("Nadia Flores".to_string()),
            phone: Masked::new("+51955443322".to_string()),
            address_line: "Av. Brasil 100".into(),
            city: "Lima".into(),
            country: "PE".into(),
        };
        let mut s = Shipment::new(tenant_id, format!("RC{:08}", n), recipient, 10_000);
        for i in 0..n {
            s.add_item(format!("article {i}"), 1);
        }
        s
    }

    async fn seeded_container(
        store: &MemoryStore,
        tenant_id: Uuid,
    ) -> (Container, Shipment) {
        let mut shipment = shipment_with_items(tenant_id, 2);
        shipment.version = ShipmentStore::put(store, &shipment).await.unwrap();

        let mut container = Container::new(tenant_id, "CT00001".into());
        container.add_summary(ShipmentSummary {
            shipment_id: shipment.id,
            tracking_code: shipment.tracking_code.clone(),
            total_items: 2,
            marked_items: 0,
        });
        container.version = ContainerStore::put(store, &container).await.unwrap();
        (container, shipment)
    }

    #[tokio::test]
    async fn stale_writes_are_version_conflicts() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let mut shipment = shipment_with_items(tenant_id, 1);

        shipment.version = ShipmentStore::put(&store, &shipment).await.unwrap();
        assert_eq!(shipment.version, 1);

        let mut stale = shipment.clone();
        stale.version = 0;
        let err = ShipmentStore::put(&store, &stale).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        shipment.version = ShipmentStore::put(&store, &shipment).await.unwrap();
        assert_eq!(shipment.version, 2);
    }

    #[tokio::test]
    async fn tracking_codes_are_unique_per_tenant() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();

        let first = shipment_with_items(tenant_id, 1);
        ShipmentStore::put(&store, &first).await.unwrap();

        let mut clash = shipment_with_items(tenant_id, 1);
        clash.tracking_code = first.tracking_code.clone();
        let err = ShipmentStore::put(&store, &clash).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        // the same code in another tenant is fine
        let mut other = shipment_with_items(Uuid::new_v4(), 1);
        other.tracking_code = first.tracking_code.clone();
        assert!(ShipmentStore::put(&store, &other).await.is_ok());
    }

    #[tokio::test]
    async fn mark_item_moves_both_documents_once() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let (container, shipment) = seeded_container(&store, tenant_id).await;
        let item_id = shipment.items[0].id;

        let outcome = store
            .mark_item(
                tenant_id,
                container.id,
                shipment.id,
                item_id,
                ItemCondition::Intact,
            )
            .await
            .unwrap();
        match outcome {
            MarkItemOutcome::Applied(summary) => {
                assert_eq!(summary.shipment_marked, 1);
                assert_eq!(summary.shipment_total, 2);
                assert_eq!(summary.container_marked, 1);
                assert_eq!(summary.container_total, 2);
                assert!(!summary.container_fully_verified());
            }
            other => panic!("expected Applied, got {other:?}"),
        }

        let again = store
            .mark_item(
                tenant_id,
                container.id,
                shipment.id,
                item_id,
                ItemCondition::Intact,
            )
            .await
            .unwrap();
        assert_eq!(again, MarkItemOutcome::AlreadyVerified);

        let stored = ShipmentStore::get(&store, tenant_id, shipment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.verified_items(), 1);
    }

    #[tokio::test]
    async fn mark_item_rejects_a_container_that_is_not_open() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let (mut container, shipment) = seeded_container(&store, tenant_id).await;

        container.update_state(ContainerState::InTransit);
        container.version = ContainerStore::put(&store, &container).await.unwrap();

        let outcome = store
            .mark_item(
                tenant_id,
                container.id,
                shipment.id,
                shipment.items[0].id,
                ItemCondition::Intact,
            )
            .await
            .unwrap();
        assert_eq!(outcome, MarkItemOutcome::ContainerNotOpen);
    }

    #[tokio::test]
    async fn finalize_lets_exactly_one_close_through() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let mut route = Route::new(tenant_id, "MF20260825-0001".into(), Uuid::new_v4(), 10_000);
        route.update_state(RouteState::InDelivery);
        route.version = RouteStore::put(&store, &route).await.unwrap();

        let mut winner = route.clone();
        winner.update_state(RouteState::Completed);
        assert!(store.finalize(&winner).await.unwrap());

        // the loser read the same version but the state already moved
        let mut loser = route.clone();
        loser.update_state(RouteState::Completed);
        assert!(!store.finalize(&loser).await.unwrap());
    }

    #[tokio::test]
    async fn tenants_never_see_each_other() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let shipment = shipment_with_items(tenant_id, 1);
        ShipmentStore::put(&store, &shipment).await.unwrap();

        let other = ShipmentStore::get(&store, Uuid::new_v4(), shipment.id)
            .await
            .unwrap();
        assert!(other.is_none());

        let by_code = store
            .get_by_tracking(Uuid::new_v4(), &shipment.tracking_code)
            .await
            .unwrap();
        assert!(by_code.is_none());
    }
}
