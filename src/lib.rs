//! # Container Apps Reconciler
//!
//! > **Declarative lifecycle management for the Azure `Microsoft.App` resource family.**
//!
//! This crate maps locally declared desired state for Managed Environments, Container
//! Apps, Jobs, certificates, Dapr components, storages and custom-domain bindings onto
//! the Azure Resource Manager API. The generic Create, Read, Update, Delete and Import
//! algorithms live in [`reconcile_framework`]; this crate supplies the per-kind pieces.
//!
//! ## 🏗️ Design Notes
//!
//! ### Secrets are never round-tripped by GET
//! The service strips secret values from every read. Before a full write the secrets
//! are re-sourced, either through `listSecrets` or from the prior local model. See the
//! table in [`resources`] for which kind uses which source.
//!
//! ### Only changed fields are written
//! Updates fetch the current remote object and overwrite only the fields whose local
//! value changed. Server-side defaults and fields owned by other resources survive.
//!
//! ### Custom domains are not resources on the wire
//! A binding is an entry in the app's ingress. Creating or deleting one rewrites the
//! whole app under the app's lock (and the certificate's), so two bindings on the same
//! app never lose each other's writes.
//!
//! ### Removals the service cannot perform are refused up front
//! Dropping a secret from an app or job is rejected before any remote call.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. Identifiers ([`ids`])
//! Typed, hierarchical ARM identifiers for every kind, with strict and
//! case-insensitive parsing.
//!
//! ### 2. Wire models ([`wire`])
//! The JSON documents exchanged with the service. Absent values are `None` and are
//! never serialized.
//!
//! ### 3. Mapping ([`mapper`])
//! Conversion between local models and wire fragments shared across kinds:
//! secrets, registries, ingress, Dapr, templates and scale rules.
//!
//! ### 4. Resource kinds ([`resources`])
//! One [`ManagedResource`](reconcile_framework::ManagedResource) implementation per kind.
//!
//! ### 5. Remote access ([`api`])
//! [`ArmClient`](api::ArmClient) for the real service, and
//! [`InMemoryControlPlane`](api::InMemoryControlPlane) for tests and the demo.
//!
//! ### 6. Wiring ([`lifecycle`])
//! [`Provider`](lifecycle::Provider) builds one reconciler per kind over a shared
//! accessor and lock coordinator.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo against the in-memory control plane
//! RUST_LOG=info cargo run
//! ```
//!
//! ```bash
//! cargo test
//! ```

pub mod api;
pub mod ids;
pub mod lifecycle;
pub mod mapper;
pub mod resources;
pub mod wire;
