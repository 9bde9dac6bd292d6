use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A container finished receipt and its shipments await client confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerReadyEvent {
    pub tenant_id: Uuid,
    pub container_id: Uuid,
    pub container_number: String,
    pub tracking_codes: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A route was finalized; the settlement figures ride along for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteClosedEvent {
    pub tenant_id: Uuid,
    pub route_id: Uuid,
    pub courier_id: Uuid,
    pub total_expenses_cents: i64,
    pub total_collected_cents: i64,
    pub amount_owed_cents: i64,
    pub is_deficit: bool,
    pub occurred_at: DateTime<Utc>,
}

/// A delivery attempt failed; downstream channels notify the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailedEvent {
    pub tenant_id: Uuid,
    pub tracking_code: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Envelope for everything the core hands to the notification dispatcher.
///
/// The core supplies structured data only; message formatting and delivery
/// happen in the (external) dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ContainerReady(ContainerReadyEvent),
    RouteClosed(RouteClosedEvent),
    DeliveryFailed(DeliveryFailedEvent),
}

impl Notification {
    pub fn tenant_id(&self) -> Uuid {
        match self {
            Self::ContainerReady(e) => e.tenant_id,
            Self::RouteClosed(e) => e.tenant_id,
            Self::DeliveryFailed(e) => e.tenant_id,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContainerReady(_) => "container_ready",
            Self::RouteClosed(_) => "route_closed",
            Self::DeliveryFailed(_) => "delivery_failed",
        }
    }
}
