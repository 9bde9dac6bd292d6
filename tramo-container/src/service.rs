use std::sync::Arc;

use chrono::Utc;
use tramo_core::directory::TenantDirectory;
use tramo_core::notify::{dispatch_best_effort, Notifier};
use tramo_core::policy::{self, Operation};
use tramo_core::sequence::{SequenceGenerator, SequenceSeries};
use tramo_core::{CoreError, CoreResult};
use tramo_shared::actor::Actor;
use tramo_shared::events::{ContainerReadyEvent, Notification};
use tramo_shipment::store::ShipmentStore;
use tramo_shipment::{lifecycle, ItemCondition, Shipment, ShipmentEvent};
use uuid::Uuid;

use crate::model::{Container, ContainerState, ShipmentSummary};
use crate::store::{ContainerStore, MarkItemOutcome};

/// Freight-leg operations: open a container, load and verify shipments,
/// close it for departure, receive and process it at destination.
#[derive(Clone)]
pub struct ContainerService {
    containers: Arc<dyn ContainerStore>,
    shipments: Arc<dyn ShipmentStore>,
    directory: Arc<dyn TenantDirectory>,
    sequences: SequenceGenerator,
    notifier: Arc<dyn Notifier>,
}

impl ContainerService {
    pub fn new(
        containers: Arc<dyn ContainerStore>,
        shipments: Arc<dyn ShipmentStore>,
        directory: Arc<dyn TenantDirectory>,
        sequences: SequenceGenerator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            containers,
            shipments,
            directory,
            sequences,
            notifier,
        }
    }

    /// Open a fresh container and hand out its number.
    pub async fn open(&self, actor: &Actor, tenant_id: Uuid) -> CoreResult<Container> {
        policy::authorize(actor, Operation::OpenContainer)?;
        policy::ensure_tenant(actor, tenant_id)?;
        self.directory.require_active(tenant_id).await?;

        let number = self
            .sequences
            .next(tenant_id, SequenceSeries::Container)
            .await?;
        let mut container = Container::new(tenant_id, number);
        container.version = self.containers.put(&container).await?;

        tracing::info!(%tenant_id, number = %container.number, "container opened");
        Ok(container)
    }

    /// Load a collected shipment into an open container. The shipment
    /// transition and the container membership commit together.
    pub async fn add_shipment(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        container_id: Uuid,
        shipment_id: Uuid,
    ) -> CoreResult<Container> {
        policy::authorize(actor, Operation::AddToContainer)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut container = self.load(tenant_id, container_id).await?;
        if container.state != ContainerState::Open {
            return Err(CoreError::Validation(format!(
                "container {} is {}, not open",
                container.number, container.state
            )));
        }
        if container.has_shipment(shipment_id) {
            return Err(CoreError::Validation(format!(
                "shipment is already loaded in container {}",
                container.number
            )));
        }

        let mut shipment = self.load_shipment(tenant_id, shipment_id).await?;
        lifecycle::apply(&mut shipment, ShipmentEvent::AddToContainer { container_id }, actor)?;

        container.add_summary(ShipmentSummary {
            shipment_id: shipment.id,
            tracking_code: shipment.tracking_code.clone(),
            total_items: shipment.total_items() as u32,
            marked_items: shipment.verified_items() as u32,
        });
        self.containers
            .put_with_shipments(&container, std::slice::from_ref(&shipment))
            .await?;

        tracing::info!(
            %tenant_id,
            number = %container.number,
            tracking_code = %shipment.tracking_code,
            "shipment loaded into container"
        );
        Ok(container)
    }

    /// Verify one physical item against the manifest, noting its
    /// condition. Safe under concurrent scanners; rejections come back in
    /// the outcome, store failures as errors.
    pub async fn mark_item(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        container_id: Uuid,
        shipment_id: Uuid,
        item_id: Uuid,
        condition: ItemCondition,
    ) -> CoreResult<MarkItemOutcome> {
        policy::authorize(actor, Operation::MarkItem)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let outcome = self
            .containers
            .mark_item(tenant_id, container_id, shipment_id, item_id, condition)
            .await?;

        match &outcome {
            MarkItemOutcome::Applied(summary) => {
                tracing::info!(
                    %tenant_id,
                    %container_id,
                    marked = summary.container_marked,
                    total = summary.container_total,
                    "item verified"
                );
                if summary.container_fully_verified() {
                    tracing::info!(%tenant_id, %container_id, "container fully verified");
                }
            }
            other => {
                tracing::debug!(%tenant_id, %container_id, outcome = ?other, "mark rejected");
            }
        }
        Ok(outcome)
    }

    /// Close the container for departure. Without `force` every item must
    /// be verified; with it, shipments with gaps travel flagged as
    /// incomplete and the rest depart normally.
    pub async fn close(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        container_id: Uuid,
        force: bool,
    ) -> CoreResult<Container> {
        policy::authorize(actor, Operation::CloseContainer)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut container = self.load(tenant_id, container_id).await?;
        if container.state != ContainerState::Open {
            return Err(CoreError::Validation(format!(
                "container {} is {}, not open",
                container.number, container.state
            )));
        }
        if container.shipments.is_empty() {
            return Err(CoreError::Validation(format!(
                "container {} has nothing loaded",
                container.number
            )));
        }

        let mut members = self.load_members(&container).await?;
        let unverified: usize = members
            .iter()
            .filter(|s| s.verified_items() < s.total_items())
            .count();
        if unverified > 0 && !force {
            return Err(CoreError::Validation(format!(
                "container {} has {unverified} shipment(s) with unverified items; close with force to flag them",
                container.number
            )));
        }

        let mut flagged = 0usize;
        for shipment in &mut members {
            let event = if shipment.verified_items() < shipment.total_items() {
                flagged += 1;
                ShipmentEvent::FlagIncomplete
            } else {
                ShipmentEvent::DepartOrigin
            };
            lifecycle::apply(shipment, event, actor)?;
        }

        container.incomplete_at_origin = flagged > 0;
        container.update_state(ContainerState::InTransit);
        self.containers
            .put_with_shipments(&container, &members)
            .await?;

        tracing::info!(
            %tenant_id,
            number = %container.number,
            shipments = members.len(),
            flagged,
            "container closed for departure"
        );
        Ok(container)
    }

    /// Check the container in at the destination office. Every member
    /// arrives, and the recipients are notified to confirm.
    pub async fn receive(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        container_id: Uuid,
    ) -> CoreResult<Container> {
        policy::authorize(actor, Operation::ReceiveContainer)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut container = self.load(tenant_id, container_id).await?;
        if container.state != ContainerState::InTransit {
            return Err(CoreError::Validation(format!(
                "container {} is {}, not in transit",
                container.number, container.state
            )));
        }

        let mut members = self.load_members(&container).await?;
        for shipment in &mut members {
            lifecycle::apply(shipment, ShipmentEvent::ArriveDestination, actor)?;
        }

        container.update_state(ContainerState::Received);
        self.containers
            .put_with_shipments(&container, &members)
            .await?;

        tracing::info!(
            %tenant_id,
            number = %container.number,
            shipments = members.len(),
            "container received at destination"
        );

        dispatch_best_effort(
            self.notifier.as_ref(),
            Notification::ContainerReady(ContainerReadyEvent {
                tenant_id,
                container_id: container.id,
                container_number: container.number.clone(),
                tracking_codes: container.tracking_codes(),
                occurred_at: Utc::now(),
            }),
        )
        .await;

        Ok(container)
    }

    /// Retire a received container once its shipments moved on.
    pub async fn mark_processed(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        container_id: Uuid,
    ) -> CoreResult<Container> {
        policy::authorize(actor, Operation::MarkContainerProcessed)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut container = self.load(tenant_id, container_id).await?;
        if container.state != ContainerState::Received {
            return Err(CoreError::Validation(format!(
                "container {} is {}, not received",
                container.number, container.state
            )));
        }

        container.update_state(ContainerState::Processed);
        container.version = self.containers.put(&container).await?;

        tracing::info!(%tenant_id, number = %container.number, "container processed");
        Ok(container)
    }

    async fn load(&self, tenant_id: Uuid, container_id: Uuid) -> CoreResult<Container> {
        self.containers
            .get(tenant_id, container_id)
            .await?
            .ok_or_else(|| CoreError::not_found("container", container_id))
    }

    async fn load_shipment(&self, tenant_id: Uuid, shipment_id: Uuid) -> CoreResult<Shipment> {
        self.shipments
            .get(tenant_id, shipment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("shipment", shipment_id))
    }

    async fn load_members(&self, container: &Container) -> CoreResult<Vec<Shipment>> {
        let mut members = Vec::with_capacity(container.shipments.len());
        for summary in &container.shipments {
            let shipment = self
                .shipments
                .get(container.tenant_id, summary.shipment_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Consistency(format!(
                        "container {} lists shipment {} that is not stored",
                        container.number, summary.shipment_id
                    ))
                })?;
            members.push(shipment);
        }
        Ok(members)
    }
}
