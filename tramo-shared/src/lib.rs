pub mod actor;
pub mod events;
pub mod pii;

pub use actor::{Actor, Role};
pub use events::{ContainerReadyEvent, DeliveryFailedEvent, Notification, RouteClosedEvent};
pub use pii::Masked;
