use uuid::Uuid;

use crate::model::{DeliveryOutcome, RouteAssignment};

/// Everything that can happen to a shipment. The lifecycle table decides
/// which of these are legal from which state; `kind` is the audit label
/// written into the transition history.
#[derive(Debug, Clone, PartialEq)]
pub enum ShipmentEvent {
    /// Courier picked the parcel up from the sender.
    Collect,
    /// Origin office loaded the parcel into an export container.
    AddToContainer { container_id: Uuid },
    /// The container left the origin country with this parcel on board.
    DepartOrigin,
    /// Container closed with unverified items; parcel held back for review.
    FlagIncomplete,
    /// Parcel checked in at the destination office.
    ArriveDestination,
    /// Destination office asked the recipient to confirm the delivery address.
    RequestConfirmation,
    /// Recipient confirmed; the parcel can be routed.
    Confirm,
    /// Dispatcher placed the parcel on a delivery route.
    AssignToRoute { assignment: RouteAssignment },
    /// Courier finished loading and started the delivery leg.
    StartDelivery,
    /// Courier recorded the outcome for one item at the door.
    RecordItemOutcome {
        item_id: Uuid,
        outcome: DeliveryOutcome,
    },
    /// Handover complete, every item accounted for.
    Deliver,
    /// Delivery attempt failed; the reason travels to the recipient.
    FailDelivery { reason: String },
    /// Failed parcel queued for a fresh confirmation and a new route.
    ResetForReassignment,
    /// Reconciliation pulled the parcel out of a container that no longer
    /// holds it.
    ReleaseFromContainer,
    /// Reconciliation pulled the parcel off a route that no longer exists
    /// or already completed.
    ReleaseFromRoute,
    /// Administrative stop before the parcel reaches a courier.
    Cancel,
}

impl ShipmentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ShipmentEvent::Collect => "collect",
            ShipmentEvent::AddToContainer { .. } => "add_to_container",
            ShipmentEvent::DepartOrigin => "depart_origin",
            ShipmentEvent::FlagIncomplete => "flag_incomplete",
            ShipmentEvent::ArriveDestination => "arrive_destination",
            ShipmentEvent::RequestConfirmation => "request_confirmation",
            ShipmentEvent::Confirm => "confirm",
            ShipmentEvent::AssignToRoute { .. } => "assign_to_route",
            ShipmentEvent::StartDelivery => "start_delivery",
            ShipmentEvent::RecordItemOutcome { .. } => "record_item_outcome",
            ShipmentEvent::Deliver => "deliver",
            ShipmentEvent::FailDelivery { .. } => "fail_delivery",
            ShipmentEvent::ResetForReassignment => "reset_for_reassignment",
            ShipmentEvent::ReleaseFromContainer => "release_from_container",
            ShipmentEvent::ReleaseFromRoute => "release_from_route",
            ShipmentEvent::Cancel => "cancel",
        }
    }
}
