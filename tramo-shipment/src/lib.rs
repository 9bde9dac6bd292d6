pub mod event;
pub mod lifecycle;
pub mod model;
pub mod service;
pub mod state;
pub mod store;
pub mod tracking;

pub use event::ShipmentEvent;
pub use model::{
    DeliveryOutcome, ItemCondition, ItemVerification, PaymentState, PaymentSummary, Recipient,
    RouteAssignment, Shipment, ShipmentItem, TransitionRecord,
};
pub use service::{NewShipment, NewShipmentItem, ShipmentService};
pub use state::ShipmentState;
pub use store::ShipmentStore;
pub use tracking::{TrackingStop, TrackingView};
