//! Aggregate drift repair.
//!
//! A container's embedded summaries and the shipments' own item lists are
//! two copies of the same fact, and shipments carry references to
//! containers and routes that can finish without them. The reconciler
//! compares the copies, rewrites summaries from the canonical shipment
//! documents, and releases shipments whose container or route is missing
//! or already finished back to a reassignable state.

use std::sync::Arc;
use std::time::Duration;

use tramo_container::model::{Container, ContainerState, ShipmentSummary};
use tramo_container::store::ContainerStore;
use tramo_core::directory::TenantDirectory;
use tramo_core::{CoreResult, StoreError};
use tramo_route::model::RouteState;
use tramo_route::store::RouteStore;
use tramo_shared::actor::{Actor, Role};
use tramo_shipment::store::ShipmentStore;
use tramo_shipment::{lifecycle, Shipment, ShipmentEvent, ShipmentState};
use uuid::Uuid;

/// What one sweep found and fixed.
#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub tenants_scanned: usize,
    pub released_from_containers: usize,
    pub released_from_routes: usize,
    pub summaries_repaired: usize,
    /// Mismatches that need a human, left untouched.
    pub warnings: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.released_from_containers == 0
            && self.released_from_routes == 0
            && self.summaries_repaired == 0
            && self.warnings.is_empty()
    }
}

/// Periodic repair pass over every tenant's aggregates.
#[derive(Clone)]
pub struct Reconciler {
    shipments: Arc<dyn ShipmentStore>,
    containers: Arc<dyn ContainerStore>,
    routes: Arc<dyn RouteStore>,
    directory: Arc<dyn TenantDirectory>,
}

impl Reconciler {
    pub fn new(
        shipments: Arc<dyn ShipmentStore>,
        containers: Arc<dyn ContainerStore>,
        routes: Arc<dyn RouteStore>,
        directory: Arc<dyn TenantDirectory>,
    ) -> Self {
        Self {
            shipments,
            containers,
            routes,
            directory,
        }
    }

    /// One full sweep. Suspended tenants are swept too; repair does not
    /// serve traffic.
    pub async fn run_once(&self) -> CoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for tenant in self.directory.all().await? {
            let actor = Actor::new(tenant.id, Role::System);
            self.sweep_containers(&actor, tenant.id, &mut report).await?;
            self.sweep_routes(&actor, tenant.id, &mut report).await?;
            report.tenants_scanned += 1;
        }

        if report.is_clean() {
            tracing::debug!(tenants = report.tenants_scanned, "nothing to reconcile");
        } else {
            tracing::info!(
                tenants = report.tenants_scanned,
                released_from_containers = report.released_from_containers,
                released_from_routes = report.released_from_routes,
                summaries_repaired = report.summaries_repaired,
                warnings = report.warnings.len(),
                "reconciliation repaired drift"
            );
        }
        Ok(report)
    }

    /// Run the sweep on a fixed interval until aborted. The first sweep
    /// fires immediately; failures are logged and the next tick runs
    /// anyway.
    pub fn spawn(self, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    tracing::error!(error = %err, "reconciliation sweep failed");
                }
            }
        })
    }

    async fn sweep_containers(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        report: &mut ReconcileReport,
    ) -> CoreResult<()> {
        let held = self
            .shipments
            .list_by_states(tenant_id, &[ShipmentState::InContainer])
            .await?;
        for mut shipment in held {
            let container = match shipment.container_id {
                Some(id) => self.containers.get(tenant_id, id).await?,
                None => None,
            };
            match container {
                Some(container) if container.state == ContainerState::Open => {
                    self.repair_summary_if_drifted(&container, &shipment, report)
                        .await?;
                }
                Some(container) if container.state == ContainerState::Processed => {
                    if self
                        .release(actor, &mut shipment, ShipmentEvent::ReleaseFromContainer)
                        .await?
                    {
                        report.released_from_containers += 1;
                    }
                }
                Some(container) => {
                    // in transit or received without the cascade having
                    // reached this shipment; releasing would lose cargo
                    report.warnings.push(format!(
                        "shipment {} is in_container but container {} is {}",
                        shipment.tracking_code, container.number, container.state
                    ));
                }
                None => {
                    if self
                        .release(actor, &mut shipment, ShipmentEvent::ReleaseFromContainer)
                        .await?
                    {
                        report.released_from_containers += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn sweep_routes(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        report: &mut ReconcileReport,
    ) -> CoreResult<()> {
        let riding = self
            .shipments
            .list_by_states(
                tenant_id,
                &[ShipmentState::InRoute, ShipmentState::ReadyForDelivery],
            )
            .await?;
        for mut shipment in riding {
            let route = match shipment.route {
                Some(assignment) => self.routes.get(tenant_id, assignment.route_id).await?,
                None => None,
            };
            let orphaned = match &route {
                None => true,
                Some(route) => route.state == RouteState::Completed,
            };
            if orphaned
                && self
                    .release(actor, &mut shipment, ShipmentEvent::ReleaseFromRoute)
                    .await?
            {
                report.released_from_routes += 1;
            }
        }
        Ok(())
    }

    async fn repair_summary_if_drifted(
        &self,
        container: &Container,
        shipment: &Shipment,
        report: &mut ReconcileReport,
    ) -> CoreResult<()> {
        let stored = match container.summary(shipment.id) {
            Some(stored) => stored,
            None => {
                report.warnings.push(format!(
                    "shipment {} points at container {} but is not on its manifest",
                    shipment.tracking_code, container.number
                ));
                return Ok(());
            }
        };

        let canonical_total = shipment.total_items() as u32;
        let canonical_marked = shipment.verified_items() as u32;
        if stored.total_items == canonical_total && stored.marked_items == canonical_marked {
            return Ok(());
        }

        self.containers
            .repair_summary(
                container.tenant_id,
                container.id,
                &ShipmentSummary {
                    shipment_id: shipment.id,
                    tracking_code: shipment.tracking_code.clone(),
                    total_items: canonical_total,
                    marked_items: canonical_marked,
                },
            )
            .await?;
        report.summaries_repaired += 1;

        tracing::warn!(
            tenant_id = %container.tenant_id,
            number = %container.number,
            tracking_code = %shipment.tracking_code,
            stored_total = stored.total_items,
            stored_marked = stored.marked_items,
            canonical_total,
            canonical_marked,
            "container summary rewritten from shipment document"
        );
        Ok(())
    }

    /// Put the shipment back into a reassignable state. A version
    /// conflict means a live writer beat the sweep, which is not drift.
    async fn release(
        &self,
        actor: &Actor,
        shipment: &mut Shipment,
        event: ShipmentEvent,
    ) -> CoreResult<bool> {
        let kind = event.kind();
        lifecycle::apply(shipment, event, actor)?;
        match self.shipments.put(shipment).await {
            Ok(_) => {
                tracing::info!(
                    tenant_id = %shipment.tenant_id,
                    tracking_code = %shipment.tracking_code,
                    kind,
                    "released orphaned shipment"
                );
                Ok(true)
            }
            Err(StoreError::VersionConflict { .. }) => {
                tracing::debug!(
                    tracking_code = %shipment.tracking_code,
                    "shipment moved while reconciling, skipped"
                );
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}
