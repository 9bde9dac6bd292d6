use serde::{Deserialize, Serialize};

/// Where a shipment sits in its door-to-door journey.
///
/// The wire form is the snake_case name; `Display` and `FromStr` use the
/// same spelling so logs, storage and the API all agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentState {
    PendingPickup,
    Collected,
    InContainer,
    InTransit,
    IncompleteAtOrigin,
    ReceivedAtDestination,
    PendingConfirmation,
    Confirmed,
    InRoute,
    ReadyForDelivery,
    Delivered,
    NotDelivered,
    Cancelled,
}

impl ShipmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentState::PendingPickup => "pending_pickup",
            ShipmentState::Collected => "collected",
            ShipmentState::InContainer => "in_container",
            ShipmentState::InTransit => "in_transit",
            ShipmentState::IncompleteAtOrigin => "incomplete_at_origin",
            ShipmentState::ReceivedAtDestination => "received_at_destination",
            ShipmentState::PendingConfirmation => "pending_confirmation",
            ShipmentState::Confirmed => "confirmed",
            ShipmentState::InRoute => "in_route",
            ShipmentState::ReadyForDelivery => "ready_for_delivery",
            ShipmentState::Delivered => "delivered",
            ShipmentState::NotDelivered => "not_delivered",
            ShipmentState::Cancelled => "cancelled",
        }
    }

    /// Terminal states take no further events. `NotDelivered` is not
    /// terminal: a reset sends the shipment back out on a new route.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentState::Delivered | ShipmentState::Cancelled)
    }
}

impl std::fmt::Display for ShipmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_pickup" => Ok(ShipmentState::PendingPickup),
            "collected" => Ok(ShipmentState::Collected),
            "in_container" => Ok(ShipmentState::InContainer),
            "in_transit" => Ok(ShipmentState::InTransit),
            "incomplete_at_origin" => Ok(ShipmentState::IncompleteAtOrigin),
            "received_at_destination" => Ok(ShipmentState::ReceivedAtDestination),
            "pending_confirmation" => Ok(ShipmentState::PendingConfirmation),
            "confirmed" => Ok(ShipmentState::Confirmed),
            "in_route" => Ok(ShipmentState::InRoute),
            "ready_for_delivery" => Ok(ShipmentState::ReadyForDelivery),
            "delivered" => Ok(ShipmentState::Delivered),
            "not_delivered" => Ok(ShipmentState::NotDelivered),
            "cancelled" => Ok(ShipmentState::Cancelled),
            other => Err(format!("unknown shipment state: {other}")),
        }
    }
}
