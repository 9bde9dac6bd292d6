use std::sync::Arc;

use tramo_core::directory::TenantDirectory;
use tramo_core::policy::{self, Operation};
use tramo_core::sequence::{SequenceGenerator, SequenceSeries};
use tramo_core::{CoreError, CoreResult};
use tramo_shared::actor::Actor;
use uuid::Uuid;

use crate::event::ShipmentEvent;
use crate::lifecycle;
use crate::model::{Recipient, Shipment};
use crate::state::ShipmentState;
use crate::store::ShipmentStore;
use crate::tracking::TrackingView;

/// Intake request as the office desk captures it.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub recipient: Recipient,
    pub items: Vec<NewShipmentItem>,
    pub declared_total_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewShipmentItem {
    pub description: String,
    pub quantity: u32,
}

/// Office-side shipment operations: intake, confirmations, invoicing,
/// payments and tracking. Container and route services drive the freight
/// and courier legs.
#[derive(Clone)]
pub struct ShipmentService {
    store: Arc<dyn ShipmentStore>,
    directory: Arc<dyn TenantDirectory>,
    sequences: SequenceGenerator,
}

impl ShipmentService {
    pub fn new(
        store: Arc<dyn ShipmentStore>,
        directory: Arc<dyn TenantDirectory>,
        sequences: SequenceGenerator,
    ) -> Self {
        Self {
            store,
            directory,
            sequences,
        }
    }

    /// Register a shipment and hand out its tracking code.
    pub async fn intake(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        new: NewShipment,
    ) -> CoreResult<Shipment> {
        policy::authorize(actor, Operation::IntakeShipment)?;
        policy::ensure_tenant(actor, tenant_id)?;
        self.directory.require_active(tenant_id).await?;

        if new.items.is_empty() {
            return Err(CoreError::Validation(
                "a shipment needs at least one item".into(),
            ));
        }
        if new.items.iter().any(|i| i.quantity == 0) {
            return Err(CoreError::Validation(
                "item quantity must be at least 1".into(),
            ));
        }
        if new.items.iter().any(|i| i.description.trim().is_empty()) {
            return Err(CoreError::Validation(
                "every item needs a description".into(),
            ));
        }
        if new.declared_total_cents < 0 {
            return Err(CoreError::Validation(
                "declared total must not be negative".into(),
            ));
        }
        if new.recipient.name.inner().trim().is_empty() {
            return Err(CoreError::Validation("recipient name is required".into()));
        }

        let tracking_code = self
            .sequences
            .next(tenant_id, SequenceSeries::Tracking)
            .await?;
        let mut shipment = Shipment::new(
            tenant_id,
            tracking_code,
            new.recipient,
            new.declared_total_cents,
        );
        for item in new.items {
            shipment.add_item(item.description, item.quantity);
        }
        self.commit(&mut shipment).await?;

        tracing::info!(
            %tenant_id,
            tracking_code = %shipment.tracking_code,
            items = shipment.total_items(),
            "shipment registered"
        );
        Ok(shipment)
    }

    /// Courier picked the parcel up from the sender.
    pub async fn collect(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
    ) -> CoreResult<Shipment> {
        self.transition(
            actor,
            tenant_id,
            shipment_id,
            Operation::CollectShipment,
            ShipmentEvent::Collect,
            None,
        )
        .await
    }

    /// Ask the recipient to confirm the delivery address.
    pub async fn request_confirmation(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
    ) -> CoreResult<Shipment> {
        self.transition(
            actor,
            tenant_id,
            shipment_id,
            Operation::RequestConfirmation,
            ShipmentEvent::RequestConfirmation,
            None,
        )
        .await
    }

    /// Recipient confirmed; the parcel becomes routable.
    pub async fn confirm(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
    ) -> CoreResult<Shipment> {
        self.transition(
            actor,
            tenant_id,
            shipment_id,
            Operation::ConfirmShipment,
            ShipmentEvent::Confirm,
            None,
        )
        .await
    }

    /// Administrative stop. Legal only before the courier leg.
    pub async fn cancel(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
        note: Option<String>,
    ) -> CoreResult<Shipment> {
        self.transition(
            actor,
            tenant_id,
            shipment_id,
            Operation::CancelShipment,
            ShipmentEvent::Cancel,
            note,
        )
        .await
    }

    /// Queue a failed parcel for a fresh confirmation and a new route.
    pub async fn reset_for_reassignment(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
    ) -> CoreResult<Shipment> {
        self.transition(
            actor,
            tenant_id,
            shipment_id,
            Operation::ResetShipment,
            ShipmentEvent::ResetForReassignment,
            None,
        )
        .await
    }

    /// Allocate a fiscal invoice number. Sold on the upper plan tiers only.
    pub async fn issue_invoice(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
    ) -> CoreResult<Shipment> {
        policy::authorize(actor, Operation::IssueInvoice)?;
        policy::ensure_tenant(actor, tenant_id)?;
        let profile = self.directory.require_active(tenant_id).await?;
        if !profile.plan.includes_fiscal_codes() {
            return Err(CoreError::Validation(format!(
                "plan {:?} does not include fiscal invoice numbering",
                profile.plan
            )));
        }

        let mut shipment = self.load(tenant_id, shipment_id).await?;
        if shipment.state() == ShipmentState::Cancelled {
            return Err(CoreError::Validation(
                "cancelled shipments cannot be invoiced".into(),
            ));
        }
        if shipment.payment.invoice_number.is_some() {
            return Err(CoreError::Validation(format!(
                "shipment {} is already invoiced",
                shipment.tracking_code
            )));
        }

        let number = self
            .sequences
            .next(tenant_id, SequenceSeries::FiscalInvoice)
            .await?;
        shipment.set_invoice_number(number.clone());
        self.commit(&mut shipment).await?;

        tracing::info!(
            %tenant_id,
            tracking_code = %shipment.tracking_code,
            invoice = %number,
            "fiscal invoice issued"
        );
        Ok(shipment)
    }

    /// Record money received at the office or at the door.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
        amount_cents: i64,
    ) -> CoreResult<Shipment> {
        policy::authorize(actor, Operation::RecordPayment)?;
        policy::ensure_tenant(actor, tenant_id)?;
        let mut shipment = self.load(tenant_id, shipment_id).await?;

        validate_payment(&shipment, amount_cents)?;
        shipment.record_payment(amount_cents);
        self.commit(&mut shipment).await?;

        tracing::info!(
            %tenant_id,
            tracking_code = %shipment.tracking_code,
            amount_cents,
            payment_state = ?shipment.payment.state,
            "payment recorded"
        );
        Ok(shipment)
    }

    /// Public tracking view for a tracking code.
    pub async fn track(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        tracking_code: &str,
    ) -> CoreResult<TrackingView> {
        policy::authorize(actor, Operation::TrackShipment)?;
        policy::ensure_tenant(actor, tenant_id)?;
        let shipment = self
            .store
            .get_by_tracking(tenant_id, tracking_code)
            .await?
            .ok_or_else(|| CoreError::not_found("shipment", tracking_code))?;
        Ok(TrackingView::project(&shipment))
    }

    async fn transition(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        shipment_id: Uuid,
        op: Operation,
        event: ShipmentEvent,
        note: Option<String>,
    ) -> CoreResult<Shipment> {
        policy::authorize(actor, op)?;
        policy::ensure_tenant(actor, tenant_id)?;
        let mut shipment = self.load(tenant_id, shipment_id).await?;

        let to = lifecycle::apply_with_note(&mut shipment, event, actor, note)?;
        self.commit(&mut shipment).await?;

        tracing::info!(
            %tenant_id,
            tracking_code = %shipment.tracking_code,
            state = %to,
            "shipment transitioned"
        );
        Ok(shipment)
    }

    async fn load(&self, tenant_id: Uuid, shipment_id: Uuid) -> CoreResult<Shipment> {
        self.store
            .get(tenant_id, shipment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("shipment", shipment_id))
    }

    async fn commit(&self, shipment: &mut Shipment) -> CoreResult<()> {
        shipment.version = self.store.put(shipment).await?;
        Ok(())
    }
}

/// Shared payment checks. The route service applies the same rules when a
/// courier takes cash at the door.
pub fn validate_payment(shipment: &Shipment, amount_cents: i64) -> CoreResult<()> {
    if amount_cents <= 0 {
        return Err(CoreError::Validation(
            "payment amount must be positive".into(),
        ));
    }
    if shipment.state() == ShipmentState::Cancelled {
        return Err(CoreError::Validation(
            "cancelled shipments take no payments".into(),
        ));
    }
    let outstanding = shipment.payment.outstanding_cents();
    if amount_cents > outstanding {
        return Err(CoreError::Validation(format!(
            "payment of {amount_cents} exceeds the outstanding {outstanding}"
        )));
    }
    Ok(())
}
