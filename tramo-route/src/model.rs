use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Assigned,
    Loaded,
    InDelivery,
    Completed,
}

impl RouteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteState::Assigned => "assigned",
            RouteState::Loaded => "loaded",
            RouteState::InDelivery => "in_delivery",
            RouteState::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RouteState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(RouteState::Assigned),
            "loaded" => Ok(RouteState::Loaded),
            "in_delivery" => Ok(RouteState::InDelivery),
            "completed" => Ok(RouteState::Completed),
            other => Err(format!("unknown route state: {other}")),
        }
    }
}

/// What happened at one stop. A stop without an outcome is still pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopOutcome {
    pub delivered: bool,
    pub collected_cents: i64,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// One shipment on the courier's manifest, with its loading and delivery
/// positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub shipment_id: Uuid,
    pub tracking_code: String,
    pub load_order: u32,
    pub delivery_order: u32,
    pub outcome: Option<StopOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Fuel,
    Toll,
    Parking,
    Meal,
    Other,
}

/// Road money the courier spent out of the float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub category: ExpenseCategory,
    pub amount_cents: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The cash position when a route closes. Pure arithmetic over the
/// route's own numbers; computing it twice gives the identical value, so
/// a replayed finalize cannot drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub total_expenses_cents: i64,
    pub total_collected_cents: i64,
    /// Float minus expenses plus collections. Negative means the company
    /// owes the courier.
    pub amount_owed_cents: i64,
    pub is_deficit: bool,
}

/// A courier's delivery round: the manifest, the cash float, expenses and
/// the eventual settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub version: i64,
    pub manifest_number: String,
    pub courier_id: Uuid,
    pub state: RouteState,
    pub float_cents: i64,
    pub manifest: Vec<ManifestEntry>,
    pub delivered_count: u32,
    pub undelivered_count: u32,
    pub expenses: Vec<Expense>,
    pub settlement: Option<Settlement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn new(tenant_id: Uuid, manifest_number: String, courier_id: Uuid, float_cents: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            version: 0,
            manifest_number,
            courier_id,
            state: RouteState::Assigned,
            float_cents,
            manifest: Vec::new(),
            delivered_count: 0,
            undelivered_count: 0,
            expenses: Vec::new(),
            settlement: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn entry(&self, shipment_id: Uuid) -> Option<&ManifestEntry> {
        self.manifest.iter().find(|e| e.shipment_id == shipment_id)
    }

    pub fn entry_mut(&mut self, shipment_id: Uuid) -> Option<&mut ManifestEntry> {
        self.manifest
            .iter_mut()
            .find(|e| e.shipment_id == shipment_id)
    }

    /// Stops still waiting for a delivery or failure record.
    pub fn pending_outcomes(&self) -> usize {
        self.manifest.iter().filter(|e| e.outcome.is_none()).count()
    }

    pub fn total_collected_cents(&self) -> i64 {
        self.manifest
            .iter()
            .filter_map(|e| e.outcome.as_ref())
            .map(|o| o.collected_cents)
            .sum()
    }

    pub fn total_expenses_cents(&self) -> i64 {
        self.expenses.iter().map(|e| e.amount_cents).sum()
    }

    /// Attach a stop outcome and bump the matching counter. The caller
    /// guarantees the entry exists and has no outcome yet.
    pub fn record_stop(&mut self, shipment_id: Uuid, outcome: StopOutcome) {
        let delivered = outcome.delivered;
        if let Some(entry) = self.entry_mut(shipment_id) {
            entry.outcome = Some(outcome);
            if delivered {
                self.delivered_count += 1;
            } else {
                self.undelivered_count += 1;
            }
            self.updated_at = Utc::now();
        }
    }

    pub fn add_expense(&mut self, expense: Expense) {
        self.expenses.push(expense);
        self.updated_at = Utc::now();
    }

    pub fn update_state(&mut self, state: RouteState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}
