//! # Observability & Tracing
//!
//! Structured logging for the engine, configured through `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Engine operations**: `Create`, `Read`, `Update`, `Delete` on entry (debug) and their
//!   outcome (`Created`, `Updated`, `Deleted`, `Imported` at info; failures at warn)
//! - **Locks**: `Locked` / `Unlocked` with the lock key at debug, waits at trace
//! - **Long-running operations**: one trace event per poll
//!
//! Every event carries `resource_type` and `id` fields, so a single object's history can
//! be filtered out of a busy log.
//!
//! ```bash
//! RUST_LOG=info cargo run      # outcomes only
//! RUST_LOG=debug cargo run     # plus entry events and locking
//! RUST_LOG=reconcile_framework=trace cargo run
//! ```
//!
//! With `RUST_LOG=debug` an update looks like:
//!
//! ```text
//! DEBUG Update resource_type="Container App" id=/subscriptions/.../containerApps/web
//! DEBUG Locked key=/subscriptions/.../containerapps/web
//! DEBUG Unlocked key=/subscriptions/.../containerapps/web
//!  INFO Updated resource_type="Container App" id=/subscriptions/.../containerApps/web
//! ```

/// Install the global subscriber. Call once, at the start of `main`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // resource_type already says where an event came from
        .compact()
        .init();
}

/// Like [`setup_tracing`] but tolerates an already installed subscriber, for tests.
pub fn try_setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}
