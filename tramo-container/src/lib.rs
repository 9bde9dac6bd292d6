pub mod model;
pub mod service;
pub mod store;

pub use model::{Container, ContainerState, ShipmentSummary};
pub use service::ContainerService;
pub use store::{ContainerStore, MarkItemOutcome, MarkSummary};
