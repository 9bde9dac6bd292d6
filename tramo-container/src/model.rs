use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Open,
    InTransit,
    Received,
    Processed,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Open => "open",
            ContainerState::InTransit => "in_transit",
            ContainerState::Received => "received",
            ContainerState::Processed => "processed",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContainerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ContainerState::Open),
            "in_transit" => Ok(ContainerState::InTransit),
            "received" => Ok(ContainerState::Received),
            "processed" => Ok(ContainerState::Processed),
            other => Err(format!("unknown container state: {other}")),
        }
    }
}

/// Per-shipment verification counters mirrored onto the container so the
/// loading desk sees progress without opening every shipment document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentSummary {
    pub shipment_id: Uuid,
    pub tracking_code: String,
    pub total_items: u32,
    pub marked_items: u32,
}

/// An export container: the box shipments travel in between countries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub version: i64,
    pub number: String,
    pub state: ContainerState,
    pub shipments: Vec<ShipmentSummary>,
    /// Set when the container was closed with unverified items on board.
    pub incomplete_at_origin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Container {
    pub fn new(tenant_id: Uuid, number: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            version: 0,
            number,
            state: ContainerState::Open,
            shipments: Vec::new(),
            incomplete_at_origin: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_shipment(&self, shipment_id: Uuid) -> bool {
        self.shipments.iter().any(|s| s.shipment_id == shipment_id)
    }

    pub fn summary(&self, shipment_id: Uuid) -> Option<&ShipmentSummary> {
        self.shipments.iter().find(|s| s.shipment_id == shipment_id)
    }

    pub fn summary_mut(&mut self, shipment_id: Uuid) -> Option<&mut ShipmentSummary> {
        self.shipments
            .iter_mut()
            .find(|s| s.shipment_id == shipment_id)
    }

    pub fn add_summary(&mut self, summary: ShipmentSummary) {
        self.shipments.push(summary);
        self.updated_at = Utc::now();
    }

    pub fn total_items(&self) -> u32 {
        self.shipments.iter().map(|s| s.total_items).sum()
    }

    pub fn marked_items(&self) -> u32 {
        self.shipments.iter().map(|s| s.marked_items).sum()
    }

    pub fn is_fully_verified(&self) -> bool {
        self.marked_items() == self.total_items()
    }

    pub fn tracking_codes(&self) -> Vec<String> {
        self.shipments
            .iter()
            .map(|s| s.tracking_code.clone())
            .collect()
    }

    pub fn update_state(&mut self, state: ContainerState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}
