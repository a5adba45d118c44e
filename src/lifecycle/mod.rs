//! Wiring the resource kinds into one provider.
//!
//! - [`Provider`] owns one reconciler per kind, all sharing one remote accessor and one
//!   lock coordinator.
//! - [`setup_tracing`] is re-exported from the framework for binaries.

pub mod provider;

pub use provider::Provider;
pub use reconcile_framework::tracing::{setup_tracing, try_setup_tracing};
