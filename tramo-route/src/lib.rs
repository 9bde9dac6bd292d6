pub mod model;
pub mod ordering;
pub mod service;
pub mod settlement;
pub mod store;

pub use model::{
    Expense, ExpenseCategory, ManifestEntry, Route, RouteState, Settlement, StopOutcome,
};
pub use ordering::PlannedStop;
pub use service::{NewExpense, NewRoute, RouteService};
pub use store::RouteStore;
