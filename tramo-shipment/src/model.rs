use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tramo_shared::actor::Role;
use tramo_shared::pii::Masked;
use uuid::Uuid;

use crate::state::ShipmentState;

/// Who receives the parcel at destination. Name and phone are personal
/// data and stay masked in logs and debug output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub name: Masked<String>,
    pub phone: Masked<String>,
    pub address_line: String,
    pub city: String,
    pub country: String,
}

/// Outcome recorded for one item at the door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Damaged,
    Missing,
}

/// Condition observed when an item is scanned into a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Intact,
    Damaged,
}

/// One declared article inside a shipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub id: Uuid,
    pub description: String,
    pub quantity: u32,
    /// Checked off against the physical parcel during container loading.
    pub verified: bool,
    /// Sticky once set; survives resets and reassignment.
    pub damaged: bool,
    pub delivery: Option<DeliveryOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    PartiallyPaid,
    Paid,
}

/// Money owed for the shipment, in integer cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub total_cents: i64,
    pub paid_cents: i64,
    pub state: PaymentState,
    pub invoice_number: Option<String>,
}

impl PaymentSummary {
    pub fn new(total_cents: i64) -> Self {
        Self {
            total_cents,
            paid_cents: 0,
            state: PaymentState::Pending,
            invoice_number: None,
        }
    }

    /// Add a received amount and recompute the payment state.
    pub fn record(&mut self, amount_cents: i64) {
        self.paid_cents += amount_cents;
        self.state = if self.paid_cents >= self.total_cents && self.total_cents > 0 {
            PaymentState::Paid
        } else if self.paid_cents > 0 {
            PaymentState::PartiallyPaid
        } else {
            PaymentState::Pending
        };
    }

    pub fn outstanding_cents(&self) -> i64 {
        self.total_cents - self.paid_cents
    }
}

/// Where a shipment sits inside a delivery route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAssignment {
    pub route_id: Uuid,
    pub load_order: u32,
    pub delivery_order: u32,
}

/// Audit entry for one applied lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ShipmentState,
    pub to: ShipmentState,
    pub event: String,
    pub role: Role,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Result of flipping an item's verification flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemVerification {
    Applied,
    AlreadyVerified,
    Unknown,
}

/// The parcel aggregate, one document per tracked shipment.
///
/// `state` and `history` are private: every state change goes through the
/// lifecycle module so it lands together with its audit record. The
/// `version` field is the optimistic-concurrency token, 0 before the
/// first write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub version: i64,
    pub tracking_code: String,
    state: ShipmentState,
    pub recipient: Recipient,
    pub items: Vec<ShipmentItem>,
    pub container_id: Option<Uuid>,
    pub route: Option<RouteAssignment>,
    pub payment: PaymentSummary,
    pub failure_reason: Option<String>,
    pub incomplete_at_origin: bool,
    history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn new(
        tenant_id: Uuid,
        tracking_code: String,
        recipient: Recipient,
        total_cents: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            version: 0,
            tracking_code,
            state: ShipmentState::PendingPickup,
            recipient,
            items: Vec::new(),
            container_id: None,
            route: None,
            payment: PaymentSummary::new(total_cents),
            failure_reason: None,
            incomplete_at_origin: false,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> ShipmentState {
        self.state
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Declare an article on the shipment and return its id.
    pub fn add_item(&mut self, description: String, quantity: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.items.push(ShipmentItem {
            id,
            description,
            quantity,
            verified: false,
            damaged: false,
            delivery: None,
        });
        self.updated_at = Utc::now();
        id
    }

    pub fn item(&self, item_id: Uuid) -> Option<&ShipmentItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub(crate) fn item_mut(&mut self, item_id: Uuid) -> Option<&mut ShipmentItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// Flip an item to verified, recording damage seen at the scan. Store
    /// backends call this inside the same commit that bumps the container
    /// counters, so the flag can only move from false to true once.
    pub fn verify_item(&mut self, item_id: Uuid, condition: ItemCondition) -> ItemVerification {
        match self.item_mut(item_id) {
            None => ItemVerification::Unknown,
            Some(item) if item.verified => ItemVerification::AlreadyVerified,
            Some(item) => {
                item.verified = true;
                if condition == ItemCondition::Damaged {
                    item.damaged = true;
                }
                ItemVerification::Applied
            }
        }
    }

    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    pub fn verified_items(&self) -> usize {
        self.items.iter().filter(|i| i.verified).count()
    }

    /// True once every item has a recorded delivery outcome.
    pub fn all_items_resolved(&self) -> bool {
        self.items.iter().all(|i| i.delivery.is_some())
    }

    pub fn resolved_items(&self) -> usize {
        self.items.iter().filter(|i| i.delivery.is_some()).count()
    }

    /// Share of items with a recorded delivery outcome, 0 to 100. The
    /// courier app shows this while a multi-item stop is in progress.
    pub fn completion_percent(&self) -> u8 {
        if self.items.is_empty() {
            return 100;
        }
        ((self.resolved_items() * 100) / self.items.len()) as u8
    }

    /// Apply a cash or office payment. Amount validation is the caller's job.
    pub fn record_payment(&mut self, amount_cents: i64) {
        self.payment.record(amount_cents);
        self.updated_at = Utc::now();
    }

    pub fn set_invoice_number(&mut self, number: String) {
        self.payment.invoice_number = Some(number);
        self.updated_at = Utc::now();
    }

    /// The single write path for state. Every change lands with its audit
    /// record and a fresh `updated_at`.
    pub(crate) fn record_transition(&mut self, record: TransitionRecord) {
        self.state = record.to;
        self.updated_at = record.at;
        self.history.push(record);
    }

    /// Wipe per-item outcomes ahead of a new delivery attempt. Damage
    /// flags stay.
    pub(crate) fn clear_delivery_outcomes(&mut self) {
        for item in &mut self.items {
            item.delivery = None;
        }
    }
}
