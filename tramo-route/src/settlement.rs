//! Route settlement arithmetic.
//!
//! A courier leaves with a cash float, spends road money from it, and
//! collects payments at the doors. When the route closes they hand back
//! float minus expenses plus collections. The computation is pure and
//! depends only on the route's recorded numbers.

use crate::model::{Route, Settlement};

pub fn compute(
    float_cents: i64,
    total_expenses_cents: i64,
    total_collected_cents: i64,
) -> Settlement {
    let amount_owed_cents = float_cents - total_expenses_cents + total_collected_cents;
    Settlement {
        total_expenses_cents,
        total_collected_cents,
        amount_owed_cents,
        is_deficit: amount_owed_cents < 0,
    }
}

/// Settle a route from its own expenses and stop collections.
pub fn settle(route: &Route) -> Settlement {
    compute(
        route.float_cents,
        route.total_expenses_cents(),
        route.total_collected_cents(),
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::model::{Expense, ExpenseCategory, ManifestEntry, Route, StopOutcome};

    use super::*;

    fn route_with(
        float_cents: i64,
        expenses: &[i64],
        collections: &[i64],
    ) -> Route {
        let mut route = Route::new(
            Uuid::new_v4(),
            "MF20260825-0001".into(),
            Uuid::new_v4(),
            float_cents,
        );
        for amount in expenses {
            route.add_expense(Expense {
                id: Uuid::new_v4(),
                category: ExpenseCategory::Fuel,
                amount_cents: *amount,
                note: None,
                created_at: Utc::now(),
            });
        }
        for (i, amount) in collections.iter().enumerate() {
            let shipment_id = Uuid::new_v4();
            route.manifest.push(ManifestEntry {
                shipment_id,
                tracking_code: format!("RC0000000{i}"),
                load_order: i as u32 + 1,
                delivery_order: i as u32 + 1,
                outcome: None,
            });
            route.record_stop(
                shipment_id,
                StopOutcome {
                    delivered: true,
                    collected_cents: *amount,
                    reason: None,
                    at: Utc::now(),
                },
            );
        }
        route
    }

    #[test]
    fn a_profitable_round_owes_the_company() {
        // 500.00 float, 120.00 + 25.00 + 15.00 road money, 300.00 and
        // 550.00 collected at the doors
        let route = route_with(50_000, &[12_000, 2_500, 1_500], &[30_000, 55_000]);
        let settlement = settle(&route);

        assert_eq!(settlement.total_expenses_cents, 16_000);
        assert_eq!(settlement.total_collected_cents, 85_000);
        assert_eq!(settlement.amount_owed_cents, 119_000);
        assert!(!settlement.is_deficit);
    }

    #[test]
    fn heavy_expenses_flip_into_deficit() {
        let route = route_with(20_000, &[40_000], &[5_000]);
        let settlement = settle(&route);

        assert_eq!(settlement.amount_owed_cents, -15_000);
        assert!(settlement.is_deficit);
    }

    #[test]
    fn an_idle_route_returns_exactly_the_float() {
        let route = route_with(35_000, &[], &[]);
        let settlement = settle(&route);

        assert_eq!(settlement.amount_owed_cents, 35_000);
        assert!(!settlement.is_deficit);
    }

    #[test]
    fn settlement_is_deterministic() {
        let route = route_with(50_000, &[1_000], &[2_000]);
        assert_eq!(settle(&route), settle(&route));
    }
}
