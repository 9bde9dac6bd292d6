//! Client-facing tracking projection.
//!
//! The view carries the destination locality and the movement timeline
//! and nothing else. Recipient identity never leaves the aggregate.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Shipment;
use crate::state::ShipmentState;

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStop {
    pub state: ShipmentState,
    pub label: &'static str,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingView {
    pub tracking_code: String,
    pub state: ShipmentState,
    pub destination_city: String,
    pub destination_country: String,
    pub registered_at: DateTime<Utc>,
    pub timeline: Vec<TrackingStop>,
}

fn label_for(state: ShipmentState) -> &'static str {
    match state {
        ShipmentState::PendingPickup => "registered at origin office",
        ShipmentState::Collected => "picked up from sender",
        ShipmentState::InContainer => "consolidated for export",
        ShipmentState::InTransit => "departed origin country",
        ShipmentState::IncompleteAtOrigin => "held at origin for verification",
        ShipmentState::ReceivedAtDestination => "arrived in destination country",
        ShipmentState::PendingConfirmation => "awaiting recipient confirmation",
        ShipmentState::Confirmed => "confirmed by recipient",
        ShipmentState::InRoute => "assigned to delivery courier",
        ShipmentState::ReadyForDelivery => "out for delivery",
        ShipmentState::Delivered => "delivered",
        ShipmentState::NotDelivered => "delivery attempt failed",
        ShipmentState::Cancelled => "cancelled",
    }
}

impl TrackingView {
    pub fn project(shipment: &Shipment) -> Self {
        let mut timeline = vec![TrackingStop {
            state: ShipmentState::PendingPickup,
            label: label_for(ShipmentState::PendingPickup),
            at: shipment.created_at,
            note: None,
        }];
        for record in shipment.history() {
            // Self-transitions are item bookkeeping, not movement.
            if record.from == record.to {
                continue;
            }
            let note = if record.event == "fail_delivery" {
                record.note.clone()
            } else {
                None
            };
            timeline.push(TrackingStop {
                state: record.to,
                label: label_for(record.to),
                at: record.at,
                note,
            });
        }
        TrackingView {
            tracking_code: shipment.tracking_code.clone(),
            state: shipment.state(),
            destination_city: shipment.recipient.city.clone(),
            destination_country: shipment.recipient.country.clone(),
            registered_at: shipment.created_at,
            timeline,
        }
    }
}
