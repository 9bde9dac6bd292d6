pub mod reconcile;

pub use reconcile::{ReconcileReport, Reconciler};
