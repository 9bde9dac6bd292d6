//! The shipment state machine.
//!
//! `next_state` is the whole transition table in one match. `apply` runs
//! legality first, then event guards, then effects, and commits the new
//! state together with its audit record. Nothing else in the workspace
//! writes shipment state.

use chrono::Utc;
use tramo_core::{CoreError, CoreResult};
use tramo_shared::actor::Actor;

use crate::event::ShipmentEvent;
use crate::model::{DeliveryOutcome, Shipment, TransitionRecord};
use crate::state::ShipmentState;

/// Target state for `event` from `state`, or `None` when the event is
/// illegal there.
pub fn next_state(state: ShipmentState, event: &ShipmentEvent) -> Option<ShipmentState> {
    use ShipmentEvent as E;
    use ShipmentState as S;

    match (state, event) {
        (S::PendingPickup, E::Collect) => Some(S::Collected),
        (S::Collected, E::AddToContainer { .. }) => Some(S::InContainer),
        (S::InContainer, E::DepartOrigin) => Some(S::InTransit),
        (S::InContainer, E::FlagIncomplete) => Some(S::IncompleteAtOrigin),
        (S::InContainer, E::ReleaseFromContainer) => Some(S::Collected),
        (S::InTransit | S::IncompleteAtOrigin, E::ArriveDestination) => {
            Some(S::ReceivedAtDestination)
        }
        (S::ReceivedAtDestination, E::RequestConfirmation) => Some(S::PendingConfirmation),
        // Confirmation can come straight from arrival when the recipient
        // reaches out before the office does.
        (S::ReceivedAtDestination | S::PendingConfirmation, E::Confirm) => Some(S::Confirmed),
        (S::Confirmed, E::AssignToRoute { .. }) => Some(S::InRoute),
        (S::InRoute, E::StartDelivery) => Some(S::ReadyForDelivery),
        (S::InRoute | S::ReadyForDelivery, E::RecordItemOutcome { .. }) => Some(state),
        (S::InRoute | S::ReadyForDelivery, E::Deliver) => Some(S::Delivered),
        (S::InRoute | S::ReadyForDelivery, E::FailDelivery { .. }) => Some(S::NotDelivered),
        (S::InRoute | S::ReadyForDelivery, E::ReleaseFromRoute) => Some(S::PendingConfirmation),
        (S::NotDelivered, E::ResetForReassignment) => Some(S::PendingConfirmation),
        (
            S::PendingPickup
            | S::Collected
            | S::ReceivedAtDestination
            | S::PendingConfirmation
            | S::Confirmed,
            E::Cancel,
        ) => Some(S::Cancelled),
        _ => None,
    }
}

/// Preconditions beyond table legality.
fn guard(shipment: &Shipment, event: &ShipmentEvent) -> CoreResult<()> {
    match event {
        ShipmentEvent::Deliver => {
            if !shipment.all_items_resolved() {
                let pending = shipment
                    .items
                    .iter()
                    .filter(|i| i.delivery.is_none())
                    .count();
                return Err(CoreError::Validation(format!(
                    "shipment {} has {pending} item(s) without a recorded outcome",
                    shipment.tracking_code
                )));
            }
        }
        ShipmentEvent::FailDelivery { reason } => {
            if reason.trim().is_empty() {
                return Err(CoreError::Validation(
                    "a failed delivery needs a reason".into(),
                ));
            }
        }
        ShipmentEvent::RecordItemOutcome { item_id, .. } => {
            if shipment.item(*item_id).is_none() {
                return Err(CoreError::Validation(format!(
                    "item {item_id} is not part of shipment {}",
                    shipment.tracking_code
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

fn apply_effects(shipment: &mut Shipment, event: &ShipmentEvent) {
    match event {
        ShipmentEvent::AddToContainer { container_id } => {
            shipment.container_id = Some(*container_id);
        }
        ShipmentEvent::ReleaseFromContainer => {
            shipment.container_id = None;
        }
        ShipmentEvent::FlagIncomplete => {
            shipment.incomplete_at_origin = true;
        }
        ShipmentEvent::AssignToRoute { assignment } => {
            shipment.route = Some(*assignment);
        }
        ShipmentEvent::RecordItemOutcome { item_id, outcome } => {
            if let Some(item) = shipment.item_mut(*item_id) {
                item.delivery = Some(*outcome);
                if *outcome == DeliveryOutcome::Damaged {
                    item.damaged = true;
                }
            }
        }
        ShipmentEvent::Deliver => {
            shipment.failure_reason = None;
        }
        ShipmentEvent::FailDelivery { reason } => {
            shipment.failure_reason = Some(reason.clone());
        }
        ShipmentEvent::ResetForReassignment | ShipmentEvent::ReleaseFromRoute => {
            shipment.route = None;
            shipment.clear_delivery_outcomes();
        }
        _ => {}
    }
}

/// Apply `event` to the shipment, or fail without touching it.
pub fn apply(
    shipment: &mut Shipment,
    event: ShipmentEvent,
    actor: &Actor,
) -> CoreResult<ShipmentState> {
    apply_with_note(shipment, event, actor, None)
}

/// Like [`apply`] with a free-text note on the audit record. Failed
/// deliveries record their reason as the note when none is given.
pub fn apply_with_note(
    shipment: &mut Shipment,
    event: ShipmentEvent,
    actor: &Actor,
    note: Option<String>,
) -> CoreResult<ShipmentState> {
    let from = shipment.state();
    let to = next_state(from, &event).ok_or_else(|| CoreError::StateTransition {
        from: from.to_string(),
        event: event.kind().to_string(),
    })?;

    guard(shipment, &event)?;

    let note = note.or_else(|| match &event {
        ShipmentEvent::FailDelivery { reason } => Some(reason.clone()),
        _ => None,
    });

    apply_effects(shipment, &event);
    shipment.record_transition(TransitionRecord {
        from,
        to,
        event: event.kind().to_string(),
        role: actor.role,
        at: Utc::now(),
        note,
    });
    Ok(to)
}

#[cfg(test)]
mod tests {
    use tramo_shared::actor::Role;
    use tramo_shared::pii::Masked;
    use uuid::Uuid;

    use crate::model::{Recipient, RouteAssignment};

    use super::*;

    fn operator() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Operator)
    }

    fn courier() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Courier)
    }

    fn shipment_with_items(n: usize) -> Shipment {
        let recipient = Recipient {
            name: Masked::new("Luis Ortega".to_string()),
            phone: Masked::new("+51999888777".to_string()),
            address_line: "Av. Arequipa 500".into(),
            city: "Lima".into(),
            country: "PE".into(),
        };
        let mut s = Shipment::new(Uuid::new_v4(), "RC00000042".into(), recipient, 50_000);
        for i in 0..n {
            s.add_item(format!("article {i}"), 1);
        }
        s
    }

    fn assignment() -> RouteAssignment {
        RouteAssignment {
            route_id: Uuid::new_v4(),
            load_order: 1,
            delivery_order: 1,
        }
    }

    fn advance(s: &mut Shipment, events: Vec<ShipmentEvent>) {
        let actor = operator();
        for event in events {
            apply(s, event, &actor).unwrap();
        }
    }

    fn to_confirmed(s: &mut Shipment) {
        advance(
            s,
            vec![
                ShipmentEvent::Collect,
                ShipmentEvent::AddToContainer {
                    container_id: Uuid::new_v4(),
                },
                ShipmentEvent::DepartOrigin,
                ShipmentEvent::ArriveDestination,
                ShipmentEvent::RequestConfirmation,
                ShipmentEvent::Confirm,
            ],
        );
    }

    #[test]
    fn full_journey_reaches_delivered() {
        let mut s = shipment_with_items(2);
        to_confirmed(&mut s);
        advance(
            &mut s,
            vec![
                ShipmentEvent::AssignToRoute {
                    assignment: assignment(),
                },
                ShipmentEvent::StartDelivery,
            ],
        );
        assert_eq!(s.state(), ShipmentState::ReadyForDelivery);

        let item_ids: Vec<Uuid> = s.items.iter().map(|i| i.id).collect();
        let actor = courier();
        for id in item_ids {
            apply(
                &mut s,
                ShipmentEvent::RecordItemOutcome {
                    item_id: id,
                    outcome: DeliveryOutcome::Delivered,
                },
                &actor,
            )
            .unwrap();
        }
        apply(&mut s, ShipmentEvent::Deliver, &actor).unwrap();

        assert_eq!(s.state(), ShipmentState::Delivered);
        assert!(s.state().is_terminal());
        // collect, add, depart, arrive, request, confirm, assign, start,
        // two item outcomes, deliver
        assert_eq!(s.history().len(), 11);
    }

    #[test]
    fn confirmation_can_skip_the_request_step() {
        let mut s = shipment_with_items(1);
        advance(
            &mut s,
            vec![
                ShipmentEvent::Collect,
                ShipmentEvent::AddToContainer {
                    container_id: Uuid::new_v4(),
                },
                ShipmentEvent::DepartOrigin,
                ShipmentEvent::ArriveDestination,
                ShipmentEvent::Confirm,
            ],
        );
        assert_eq!(s.state(), ShipmentState::Confirmed);
    }

    #[test]
    fn delivery_can_happen_before_start_delivery() {
        let mut s = shipment_with_items(1);
        to_confirmed(&mut s);
        advance(
            &mut s,
            vec![ShipmentEvent::AssignToRoute {
                assignment: assignment(),
            }],
        );

        let item_id = s.items[0].id;
        let actor = courier();
        apply(
            &mut s,
            ShipmentEvent::RecordItemOutcome {
                item_id,
                outcome: DeliveryOutcome::Delivered,
            },
            &actor,
        )
        .unwrap();
        apply(&mut s, ShipmentEvent::Deliver, &actor).unwrap();
        assert_eq!(s.state(), ShipmentState::Delivered);
    }

    #[test]
    fn delivering_a_collected_shipment_is_illegal() {
        let mut s = shipment_with_items(1);
        advance(&mut s, vec![ShipmentEvent::Collect]);

        let err = apply(&mut s, ShipmentEvent::Deliver, &courier()).unwrap_err();
        match err {
            CoreError::StateTransition { from, event } => {
                assert_eq!(from, "collected");
                assert_eq!(event, "deliver");
            }
            other => panic!("expected StateTransition, got {other:?}"),
        }
        assert_eq!(s.state(), ShipmentState::Collected);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn deliver_is_blocked_until_every_item_has_an_outcome() {
        let mut s = shipment_with_items(2);
        to_confirmed(&mut s);
        advance(
            &mut s,
            vec![ShipmentEvent::AssignToRoute {
                assignment: assignment(),
            }],
        );

        let err = apply(&mut s, ShipmentEvent::Deliver, &courier()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(s.state(), ShipmentState::InRoute);
    }

    #[test]
    fn failed_delivery_needs_a_reason_and_records_it() {
        let mut s = shipment_with_items(1);
        to_confirmed(&mut s);
        advance(
            &mut s,
            vec![ShipmentEvent::AssignToRoute {
                assignment: assignment(),
            }],
        );

        let err = apply(
            &mut s,
            ShipmentEvent::FailDelivery { reason: "  ".into() },
            &courier(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        apply(
            &mut s,
            ShipmentEvent::FailDelivery {
                reason: "nobody home after two rings".into(),
            },
            &courier(),
        )
        .unwrap();
        assert_eq!(s.state(), ShipmentState::NotDelivered);
        assert_eq!(
            s.failure_reason.as_deref(),
            Some("nobody home after two rings")
        );
        let last = s.history().last().unwrap();
        assert_eq!(last.note.as_deref(), Some("nobody home after two rings"));
        assert_eq!(last.role, Role::Courier);
    }

    #[test]
    fn reset_clears_route_and_outcomes_but_keeps_damage() {
        let mut s = shipment_with_items(1);
        to_confirmed(&mut s);
        advance(
            &mut s,
            vec![ShipmentEvent::AssignToRoute {
                assignment: assignment(),
            }],
        );
        let item_id = s.items[0].id;
        apply(
            &mut s,
            ShipmentEvent::RecordItemOutcome {
                item_id,
                outcome: DeliveryOutcome::Damaged,
            },
            &courier(),
        )
        .unwrap();
        apply(
            &mut s,
            ShipmentEvent::FailDelivery {
                reason: "refused: box crushed".into(),
            },
            &courier(),
        )
        .unwrap();

        apply(&mut s, ShipmentEvent::ResetForReassignment, &operator()).unwrap();

        assert_eq!(s.state(), ShipmentState::PendingConfirmation);
        assert!(s.route.is_none());
        assert!(s.items[0].delivery.is_none());
        assert!(s.items[0].damaged);
    }

    #[test]
    fn cancel_is_legal_only_before_the_courier_leg() {
        let cancellable = |events: Vec<ShipmentEvent>| {
            let mut s = shipment_with_items(1);
            advance(&mut s, events);
            apply(&mut s, ShipmentEvent::Cancel, &operator()).is_ok()
        };

        assert!(cancellable(vec![]));
        assert!(cancellable(vec![ShipmentEvent::Collect]));
        assert!(!cancellable(vec![
            ShipmentEvent::Collect,
            ShipmentEvent::AddToContainer {
                container_id: Uuid::new_v4()
            },
            ShipmentEvent::DepartOrigin,
        ]));

        let mut s = shipment_with_items(1);
        to_confirmed(&mut s);
        advance(
            &mut s,
            vec![ShipmentEvent::AssignToRoute {
                assignment: assignment(),
            }],
        );
        assert!(apply(&mut s, ShipmentEvent::Cancel, &operator()).is_err());
    }

    #[test]
    fn release_from_container_returns_to_collected() {
        let mut s = shipment_with_items(1);
        advance(
            &mut s,
            vec![
                ShipmentEvent::Collect,
                ShipmentEvent::AddToContainer {
                    container_id: Uuid::new_v4(),
                },
            ],
        );
        assert!(s.container_id.is_some());

        apply(&mut s, ShipmentEvent::ReleaseFromContainer, &operator()).unwrap();
        assert_eq!(s.state(), ShipmentState::Collected);
        assert!(s.container_id.is_none());
    }

    #[test]
    fn incomplete_container_path_reaches_destination() {
        let mut s = shipment_with_items(1);
        advance(
            &mut s,
            vec![
                ShipmentEvent::Collect,
                ShipmentEvent::AddToContainer {
                    container_id: Uuid::new_v4(),
                },
                ShipmentEvent::FlagIncomplete,
            ],
        );
        assert_eq!(s.state(), ShipmentState::IncompleteAtOrigin);
        assert!(s.incomplete_at_origin);

        apply(&mut s, ShipmentEvent::ArriveDestination, &operator()).unwrap();
        assert_eq!(s.state(), ShipmentState::ReceivedAtDestination);
        assert!(s.incomplete_at_origin, "flag survives arrival for review");
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let mut s = shipment_with_items(1);
        to_confirmed(&mut s);
        apply(&mut s, ShipmentEvent::Cancel, &operator()).unwrap();

        assert!(apply(&mut s, ShipmentEvent::Collect, &operator()).is_err());
        assert!(apply(
            &mut s,
            ShipmentEvent::AssignToRoute {
                assignment: assignment()
            },
            &operator()
        )
        .is_err());
    }
}
