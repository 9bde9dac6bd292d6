//! Role-based authorization for every governed operation.
//!
//! The table is deliberately a single match so a reviewer can read the
//! whole permission surface in one place. Tenant scoping is a separate
//! check: a role grant never crosses tenants unless the role itself does.

use tramo_shared::actor::{Actor, Role};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Every operation a caller can request. Names double as audit labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    IntakeShipment,
    CollectShipment,
    RequestConfirmation,
    ConfirmShipment,
    CancelShipment,
    ResetShipment,
    IssueInvoice,
    RecordPayment,
    TrackShipment,
    OpenContainer,
    AddToContainer,
    MarkItem,
    CloseContainer,
    ReceiveContainer,
    MarkContainerProcessed,
    CreateRoute,
    MarkRouteLoaded,
    BeginDelivery,
    RecordItemOutcome,
    RecordDelivery,
    RecordFailure,
    AddExpense,
    PreviewSettlement,
    FinalizeRoute,
    RunReconciliation,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::IntakeShipment => "intake_shipment",
            Operation::CollectShipment => "collect_shipment",
            Operation::RequestConfirmation => "request_confirmation",
            Operation::ConfirmShipment => "confirm_shipment",
            Operation::CancelShipment => "cancel_shipment",
            Operation::ResetShipment => "reset_shipment",
            Operation::IssueInvoice => "issue_invoice",
            Operation::RecordPayment => "record_payment",
            Operation::TrackShipment => "track_shipment",
            Operation::OpenContainer => "open_container",
            Operation::AddToContainer => "add_to_container",
            Operation::MarkItem => "mark_item",
            Operation::CloseContainer => "close_container",
            Operation::ReceiveContainer => "receive_container",
            Operation::MarkContainerProcessed => "mark_container_processed",
            Operation::CreateRoute => "create_route",
            Operation::MarkRouteLoaded => "mark_route_loaded",
            Operation::BeginDelivery => "begin_delivery",
            Operation::RecordItemOutcome => "record_item_outcome",
            Operation::RecordDelivery => "record_delivery",
            Operation::RecordFailure => "record_failure",
            Operation::AddExpense => "add_expense",
            Operation::PreviewSettlement => "preview_settlement",
            Operation::FinalizeRoute => "finalize_route",
            Operation::RunReconciliation => "run_reconciliation",
        }
    }
}

/// Whether `role` may perform `op` inside its own tenant.
pub fn allows(role: Role, op: Operation) -> bool {
    use Operation::*;

    match role {
        Role::PlatformAdmin => true,
        Role::System => matches!(op, RunReconciliation | TrackShipment),
        Role::Operator => matches!(
            op,
            IntakeShipment
                | CollectShipment
                | RequestConfirmation
                | ConfirmShipment
                | CancelShipment
                | ResetShipment
                | IssueInvoice
                | RecordPayment
                | TrackShipment
                | OpenContainer
                | AddToContainer
                | MarkItem
                | CloseContainer
                | ReceiveContainer
                | MarkContainerProcessed
        ),
        Role::Dispatcher => matches!(
            op,
            CreateRoute
                | MarkRouteLoaded
                | BeginDelivery
                | PreviewSettlement
                | FinalizeRoute
                | ResetShipment
                | TrackShipment
        ),
        Role::Courier => matches!(
            op,
            MarkRouteLoaded
                | BeginDelivery
                | RecordItemOutcome
                | RecordDelivery
                | RecordFailure
                | AddExpense
                | RecordPayment
                | PreviewSettlement
                | TrackShipment
        ),
        Role::Client => matches!(op, TrackShipment),
    }
}

/// Reject the call unless the actor's role carries the grant.
pub fn authorize(actor: &Actor, op: Operation) -> CoreResult<()> {
    if allows(actor.role, op) {
        Ok(())
    } else {
        Err(CoreError::Authorization(format!(
            "role {} may not {}",
            actor.role,
            op.name()
        )))
    }
}

/// Reject the call unless the actor may touch `tenant_id`'s data.
pub fn ensure_tenant(actor: &Actor, tenant_id: Uuid) -> CoreResult<()> {
    if actor.role.is_cross_tenant() || actor.tenant_id == tenant_id {
        Ok(())
    } else {
        Err(CoreError::Authorization(format!(
            "actor in tenant {} may not touch tenant {}",
            actor.tenant_id, tenant_id
        )))
    }
}
