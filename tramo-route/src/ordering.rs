//! Delivery-order planning.
//!
//! Parcels come off the van in reverse loading order, so by default the
//! last shipment loaded is the first delivered. Dispatchers can pin
//! individual shipments to fixed delivery positions; everything unpinned
//! keeps the reverse-loading order across the remaining slots.

use std::collections::{HashMap, HashSet};

use tramo_core::{CoreError, CoreResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStop {
    pub shipment_id: Uuid,
    pub load_order: u32,
    pub delivery_order: u32,
}

/// Compute loading and delivery positions for a route.
///
/// `shipment_ids` is the loading sequence as the van is packed; `pins`
/// maps a shipment to a fixed delivery position (1-based). The result is
/// aligned with the input order.
pub fn plan(
    shipment_ids: &[Uuid],
    pins: &HashMap<Uuid, u32>,
) -> CoreResult<Vec<PlannedStop>> {
    let n = shipment_ids.len();
    if n == 0 {
        return Err(CoreError::Validation(
            "a route needs at least one shipment".into(),
        ));
    }
    let unique: HashSet<&Uuid> = shipment_ids.iter().collect();
    if unique.len() != n {
        return Err(CoreError::Validation(
            "route plan lists a shipment twice".into(),
        ));
    }

    let n_u32 = n as u32;
    let mut pinned_positions: HashSet<u32> = HashSet::new();
    for (id, pos) in pins {
        if !unique.contains(id) {
            return Err(CoreError::Validation(format!(
                "pinned shipment {id} is not on the route"
            )));
        }
        if *pos == 0 || *pos > n_u32 {
            return Err(CoreError::Validation(format!(
                "pinned delivery position {pos} is outside 1..={n}"
            )));
        }
        if !pinned_positions.insert(*pos) {
            return Err(CoreError::Validation(format!(
                "delivery position {pos} is pinned twice"
            )));
        }
    }

    let mut stops: Vec<PlannedStop> = shipment_ids
        .iter()
        .enumerate()
        .map(|(i, id)| PlannedStop {
            shipment_id: *id,
            load_order: i as u32 + 1,
            delivery_order: pins.get(id).copied().unwrap_or(0),
        })
        .collect();

    // Unpinned stops take the free positions: highest load order first,
    // lowest free position first. Counts match by construction, so the
    // zip is exact.
    let free = (1..=n_u32).filter(|p| !pinned_positions.contains(p));
    let unpinned = stops.iter_mut().rev().filter(|s| s.delivery_order == 0);
    for (stop, pos) in unpinned.zip(free) {
        stop.delivery_order = pos;
    }

    Ok(stops)
}
