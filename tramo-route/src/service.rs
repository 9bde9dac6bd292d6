use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tramo_core::directory::TenantDirectory;
use tramo_core::notify::{dispatch_best_effort, Notifier};
use tramo_core::policy::{self, Operation};
use tramo_core::sequence::{SequenceGenerator, SequenceSeries};
use tramo_core::{CoreError, CoreResult};
use tramo_shared::actor::Actor;
use tramo_shared::events::{DeliveryFailedEvent, Notification, RouteClosedEvent};
use tramo_shipment::service::validate_payment;
use tramo_shipment::store::ShipmentStore;
use tramo_shipment::{lifecycle, DeliveryOutcome, RouteAssignment, Shipment, ShipmentEvent};
use uuid::Uuid;

use crate::model::{Expense, ExpenseCategory, ManifestEntry, Route, RouteState, Settlement, StopOutcome};
use crate::ordering;
use crate::settlement;
use crate::store::RouteStore;

/// Route creation request from the dispatch desk.
#[derive(Debug, Clone)]
pub struct NewRoute {
    pub courier_id: Uuid,
    pub float_cents: i64,
    /// Loading sequence as the van is packed.
    pub shipment_ids: Vec<Uuid>,
    /// Fixed delivery positions, 1-based, by shipment.
    pub pins: HashMap<Uuid, u32>,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub category: ExpenseCategory,
    pub amount_cents: i64,
    pub note: Option<String>,
}

/// Courier-leg operations: build the route, run the deliveries, track the
/// cash and close the round out with a settlement.
#[derive(Clone)]
pub struct RouteService {
    routes: Arc<dyn RouteStore>,
    shipments: Arc<dyn ShipmentStore>,
    directory: Arc<dyn TenantDirectory>,
    sequences: SequenceGenerator,
    notifier: Arc<dyn Notifier>,
}

impl RouteService {
    pub fn new(
        routes: Arc<dyn RouteStore>,
        shipments: Arc<dyn ShipmentStore>,
        directory: Arc<dyn TenantDirectory>,
        sequences: SequenceGenerator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            routes,
            shipments,
            directory,
            sequences,
            notifier,
        }
    }

    /// Plan a route over confirmed shipments. Assignments and the route
    /// itself commit together.
    pub async fn create(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        new: NewRoute,
    ) -> CoreResult<Route> {
        policy::authorize(actor, Operation::CreateRoute)?;
        policy::ensure_tenant(actor, tenant_id)?;
        self.directory.require_active(tenant_id).await?;

        if new.float_cents < 0 {
            return Err(CoreError::Validation(
                "the cash float must not be negative".into(),
            ));
        }
        let stops = ordering::plan(&new.shipment_ids, &new.pins)?;

        let manifest_number = self
            .sequences
            .next(tenant_id, SequenceSeries::Manifest)
            .await?;
        let mut route = Route::new(tenant_id, manifest_number, new.courier_id, new.float_cents);

        let mut members = Vec::with_capacity(stops.len());
        for stop in &stops {
            let mut shipment = self.load_shipment(tenant_id, stop.shipment_id).await?;
            lifecycle::apply(
                &mut shipment,
                ShipmentEvent::AssignToRoute {
                    assignment: RouteAssignment {
                        route_id: route.id,
                        load_order: stop.load_order,
                        delivery_order: stop.delivery_order,
                    },
                },
                actor,
            )?;
            route.manifest.push(ManifestEntry {
                shipment_id: shipment.id,
                tracking_code: shipment.tracking_code.clone(),
                load_order: stop.load_order,
                delivery_order: stop.delivery_order,
                outcome: None,
            });
            members.push(shipment);
        }

        self.routes.put_with_shipments(&route, &members).await?;

        tracing::info!(
            %tenant_id,
            manifest = %route.manifest_number,
            courier_id = %route.courier_id,
            stops = route.manifest.len(),
            float_cents = route.float_cents,
            "route created"
        );
        Ok(route)
    }

    /// Courier confirmed the van is packed in manifest order.
    pub async fn mark_loaded(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
    ) -> CoreResult<Route> {
        policy::authorize(actor, Operation::MarkRouteLoaded)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut route = self.load(tenant_id, route_id).await?;
        if route.state != RouteState::Assigned {
            return Err(CoreError::Validation(format!(
                "route {} is {}, not freshly assigned",
                route.manifest_number, route.state
            )));
        }

        route.update_state(RouteState::Loaded);
        route.version = self.routes.put(&route).await?;

        tracing::info!(%tenant_id, manifest = %route.manifest_number, "route loaded");
        Ok(route)
    }

    /// Start the delivery leg. Every shipment on the manifest goes out
    /// for delivery in the same commit.
    pub async fn begin_delivery(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
    ) -> CoreResult<Route> {
        policy::authorize(actor, Operation::BeginDelivery)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut route = self.load(tenant_id, route_id).await?;
        if route.state != RouteState::Loaded {
            return Err(CoreError::Validation(format!(
                "route {} is {}, not loaded",
                route.manifest_number, route.state
            )));
        }

        let mut members = self.load_members(&route).await?;
        for shipment in &mut members {
            lifecycle::apply(shipment, ShipmentEvent::StartDelivery, actor)?;
        }

        route.update_state(RouteState::InDelivery);
        self.routes.put_with_shipments(&route, &members).await?;

        tracing::info!(%tenant_id, manifest = %route.manifest_number, "delivery leg started");
        Ok(route)
    }

    /// Record the outcome for one item of a shipment at the door.
    pub async fn record_item(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
        shipment_id: Uuid,
        item_id: Uuid,
        outcome: DeliveryOutcome,
    ) -> CoreResult<Shipment> {
        policy::authorize(actor, Operation::RecordItemOutcome)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let route = self.load(tenant_id, route_id).await?;
        self.ensure_route_active(&route)?;
        if route.entry(shipment_id).is_none() {
            return Err(CoreError::Validation(format!(
                "shipment is not on route {}",
                route.manifest_number
            )));
        }

        let mut shipment = self.load_shipment(tenant_id, shipment_id).await?;
        lifecycle::apply(
            &mut shipment,
            ShipmentEvent::RecordItemOutcome { item_id, outcome },
            actor,
        )?;
        shipment.version = self.shipments.put(&shipment).await?;
        Ok(shipment)
    }

    /// Hand the parcel over. Cash taken at the door lands on the shipment
    /// and counts toward the route settlement, all in one commit.
    pub async fn record_delivery(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
        shipment_id: Uuid,
        collected_cents: i64,
    ) -> CoreResult<Route> {
        policy::authorize(actor, Operation::RecordDelivery)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut route = self.load(tenant_id, route_id).await?;
        self.ensure_route_active(&route)?;
        self.ensure_stop_open(&route, shipment_id)?;
        if collected_cents < 0 {
            return Err(CoreError::Validation(
                "collected amount must not be negative".into(),
            ));
        }

        let mut shipment = self.load_shipment(tenant_id, shipment_id).await?;
        if collected_cents > 0 {
            validate_payment(&shipment, collected_cents)?;
            shipment.record_payment(collected_cents);
        }
        lifecycle::apply(&mut shipment, ShipmentEvent::Deliver, actor)?;

        route.record_stop(
            shipment_id,
            StopOutcome {
                delivered: true,
                collected_cents,
                reason: None,
                at: Utc::now(),
            },
        );
        self.routes
            .put_with_shipments(&route, std::slice::from_ref(&shipment))
            .await?;

        tracing::info!(
            %tenant_id,
            manifest = %route.manifest_number,
            tracking_code = %shipment.tracking_code,
            collected_cents,
            "delivery recorded"
        );
        Ok(route)
    }

    /// Record a failed attempt. The reason is mandatory and travels to
    /// the recipient.
    pub async fn record_failure(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
        shipment_id: Uuid,
        reason: String,
    ) -> CoreResult<Route> {
        policy::authorize(actor, Operation::RecordFailure)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut route = self.load(tenant_id, route_id).await?;
        self.ensure_route_active(&route)?;
        self.ensure_stop_open(&route, shipment_id)?;

        let mut shipment = self.load_shipment(tenant_id, shipment_id).await?;
        lifecycle::apply(
            &mut shipment,
            ShipmentEvent::FailDelivery {
                reason: reason.clone(),
            },
            actor,
        )?;

        route.record_stop(
            shipment_id,
            StopOutcome {
                delivered: false,
                collected_cents: 0,
                reason: Some(reason.clone()),
                at: Utc::now(),
            },
        );
        self.routes
            .put_with_shipments(&route, std::slice::from_ref(&shipment))
            .await?;

        tracing::info!(
            %tenant_id,
            manifest = %route.manifest_number,
            tracking_code = %shipment.tracking_code,
            "delivery failure recorded"
        );

        dispatch_best_effort(
            self.notifier.as_ref(),
            Notification::DeliveryFailed(DeliveryFailedEvent {
                tenant_id,
                tracking_code: shipment.tracking_code.clone(),
                reason,
                occurred_at: Utc::now(),
            }),
        )
        .await;

        Ok(route)
    }

    /// Road money spent from the float.
    pub async fn add_expense(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
        new: NewExpense,
    ) -> CoreResult<Route> {
        policy::authorize(actor, Operation::AddExpense)?;
        policy::ensure_tenant(actor, tenant_id)?;

        if new.amount_cents <= 0 {
            return Err(CoreError::Validation(
                "expense amount must be positive".into(),
            ));
        }
        let mut route = self.load(tenant_id, route_id).await?;
        if route.state == RouteState::Completed {
            return Err(CoreError::Validation(format!(
                "route {} is settled; it takes no more expenses",
                route.manifest_number
            )));
        }

        route.add_expense(Expense {
            id: Uuid::new_v4(),
            category: new.category,
            amount_cents: new.amount_cents,
            note: new.note,
            created_at: Utc::now(),
        });
        route.version = self.routes.put(&route).await?;

        tracing::info!(
            %tenant_id,
            manifest = %route.manifest_number,
            amount_cents = new.amount_cents,
            category = ?new.category,
            "expense recorded"
        );
        Ok(route)
    }

    /// The settlement as it stands right now, without closing anything.
    pub async fn settlement_preview(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
    ) -> CoreResult<Settlement> {
        policy::authorize(actor, Operation::PreviewSettlement)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let route = self.load(tenant_id, route_id).await?;
        Ok(route.settlement.unwrap_or_else(|| settlement::settle(&route)))
    }

    /// Close the route out. Every stop needs an outcome first; the
    /// settlement embeds into the route in the same compare-and-swap that
    /// completes it, so two concurrent closes produce exactly one.
    pub async fn finalize(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        route_id: Uuid,
    ) -> CoreResult<Route> {
        policy::authorize(actor, Operation::FinalizeRoute)?;
        policy::ensure_tenant(actor, tenant_id)?;

        let mut route = self.load(tenant_id, route_id).await?;
        if route.state == RouteState::Completed {
            return Ok(route);
        }
        if route.state != RouteState::InDelivery {
            return Err(CoreError::Validation(format!(
                "route {} is {}, the delivery leg has not started",
                route.manifest_number, route.state
            )));
        }
        let pending = route.pending_outcomes();
        if pending > 0 {
            return Err(CoreError::PendingDeliveries { route_id, pending });
        }

        let settlement = settlement::settle(&route);
        route.settlement = Some(settlement);
        route.update_state(RouteState::Completed);

        if !self.routes.finalize(&route).await? {
            let current = self.load(tenant_id, route_id).await?;
            if current.state == RouteState::Completed {
                // the concurrent close won with the identical settlement
                return Ok(current);
            }
            return Err(CoreError::Consistency(format!(
                "route {} changed while closing; retry",
                route.manifest_number
            )));
        }
        route.version += 1;

        tracing::info!(
            %tenant_id,
            manifest = %route.manifest_number,
            amount_owed_cents = settlement.amount_owed_cents,
            is_deficit = settlement.is_deficit,
            "route settled"
        );

        dispatch_best_effort(
            self.notifier.as_ref(),
            Notification::RouteClosed(RouteClosedEvent {
                tenant_id,
                route_id: route.id,
                courier_id: route.courier_id,
                total_expenses_cents: settlement.total_expenses_cents,
                total_collected_cents: settlement.total_collected_cents,
                amount_owed_cents: settlement.amount_owed_cents,
                is_deficit: settlement.is_deficit,
                occurred_at: Utc::now(),
            }),
        )
        .await;

        Ok(route)
    }

    /// Outcomes can be recorded once the van is packed; the formal
    /// delivery leg may start a stop or two late.
    fn ensure_route_active(&self, route: &Route) -> CoreResult<()> {
        match route.state {
            RouteState::Loaded | RouteState::InDelivery => Ok(()),
            _ => Err(CoreError::Validation(format!(
                "route {} is {}, not out for delivery",
                route.manifest_number, route.state
            ))),
        }
    }

    fn ensure_stop_open(&self, route: &Route, shipment_id: Uuid) -> CoreResult<()> {
        let entry = route.entry(shipment_id).ok_or_else(|| {
            CoreError::Validation(format!(
                "shipment is not on route {}",
                route.manifest_number
            ))
        })?;
        if entry.outcome.is_some() {
            return Err(CoreError::Validation(format!(
                "stop {} already has an outcome",
                entry.tracking_code
            )));
        }
        Ok(())
    }

    async fn load(&self, tenant_id: Uuid, route_id: Uuid) -> CoreResult<Route> {
        self.routes
            .get(tenant_id, route_id)
            .await?
            .ok_or_else(|| CoreError::not_found("route", route_id))
    }

    async fn load_shipment(&self, tenant_id: Uuid, shipment_id: Uuid) -> CoreResult<Shipment> {
        self.shipments
            .get(tenant_id, shipment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("shipment", shipment_id))
    }

    async fn load_members(&self, route: &Route) -> CoreResult<Vec<Shipment>> {
        let mut members = Vec::with_capacity(route.manifest.len());
        for entry in &route.manifest {
            let shipment = self
                .shipments
                .get(route.tenant_id, entry.shipment_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Consistency(format!(
                        "route {} lists shipment {} that is not stored",
                        route.manifest_number, entry.shipment_id
                    ))
                })?;
            members.push(shipment);
        }
        Ok(members)
    }
}
