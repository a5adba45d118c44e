//! # Reconcile Framework
//!
//! Building blocks for reconciling declared desired state against a remote control plane
//! that is eventually consistent, asynchronous and picky about what it accepts back.
//!
//! ## Architecture Overview
//!
//! The framework separates concerns into layers:
//!
//! 1. **Resource Layer** ([`ManagedResource`], [`EmbeddedResource`]): per-kind
//!    identifiers, state mapping, secret re-sourcing and transition checks.
//! 2. **Engine Layer** ([`Reconciler`], [`CollectionReconciler`]): the Create, Read,
//!    Update, Delete and Import algorithms, written once for every kind.
//! 3. **Remote Layer** ([`RemoteApi`], [`SecretLister`], [`Poller`]): typed access to the
//!    control plane, including long-running operations.
//!
//! Cross-cutting pieces:
//!
//! - [`id`]: the hierarchical identifier codec.
//! - [`lock`]: keyed mutual exclusion for read-modify-write sequences.
//! - [`change`]: which fields of the local model changed since the last apply.
//! - [`guard`]: refusing transitions the remote cannot perform in place.
//! - [`value`]: open-typed wire values.
//! - [`config`]: per-phase deadlines and poll pacing.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use reconcile_framework::id::{IdPattern, ResourceId, Segment};
//! use reconcile_framework::mock::MockRemote;
//! use reconcile_framework::{
//!     EngineConfig, KeyedLocks, ManagedResource, MappingError, Plan, ReadOutcome,
//!     ReconcileError, Reconciler, Scope,
//! };
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! struct NoteId { subscription: String, name: String }
//!
//! impl ResourceId for NoteId {
//!     const KIND: &'static str = "Note";
//!     const PATTERN: IdPattern = IdPattern::new(&[
//!         Segment::Static("subscriptions"), Segment::Value("subscription"),
//!         Segment::Static("notes"), Segment::Value("name"),
//!     ]);
//!     fn from_values(v: Vec<String>) -> Self {
//!         let mut v = v.into_iter();
//!         Self { subscription: v.next().unwrap_or_default(), name: v.next().unwrap_or_default() }
//!     }
//!     fn values(&self) -> Vec<&str> { vec![self.subscription.as_str(), self.name.as_str()] }
//! }
//! impl std::fmt::Display for NoteId {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str(&self.format_id())
//!     }
//! }
//!
//! #[derive(Debug, Clone, PartialEq, Serialize)]
//! struct Note { name: String, text: String }
//!
//! struct NoteResource;
//!
//! #[async_trait]
//! impl ManagedResource for NoteResource {
//!     const RESOURCE_TYPE: &'static str = "Note";
//!     type Id = NoteId;
//!     type Model = Note;
//!     type Wire = String;
//!     type Api = MockRemote<String>;
//!
//!     fn resource_id(scope: &Scope, model: &Note) -> Result<NoteId, ReconcileError> {
//!         Ok(NoteId { subscription: scope.subscription_id.clone(), name: model.name.clone() })
//!     }
//!     fn expand(model: &Note) -> Result<String, MappingError> { Ok(model.text.clone()) }
//!     fn flatten(id: &NoteId, wire: String, _: Option<&Note>) -> Note {
//!         Note { name: id.name.clone(), text: wire }
//!     }
//!     fn apply_changes(wire: &mut String, plan: &Plan<Note>) -> Result<(), MappingError> {
//!         if plan.has_change("text") { *wire = plan.proposed.text.clone(); }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let notes = Reconciler::<NoteResource>::new(
//!         Arc::new(MockRemote::new()),
//!         Arc::new(KeyedLocks::new()),
//!         Scope::new("sub"),
//!         EngineConfig::immediate(),
//!     );
//!
//!     let desired = Note { name: "todo".into(), text: "buy milk".into() };
//!     let id = notes.create(&desired).await.unwrap();
//!     let read = notes.read(&id.to_string(), Some(&desired)).await.unwrap();
//!     assert_eq!(read, ReadOutcome::Present(desired));
//!
//!     notes.delete(&id.to_string()).await.unwrap();
//!     notes.delete(&id.to_string()).await.unwrap(); // already gone is fine
//! }
//! ```
//!
//! ## Testing
//!
//! The [`mock`] module provides [`mock::MockRemote`] and [`mock::RecordingLocks`] for
//! exercising the engine without a network.

pub mod change;
pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod id;
pub mod lock;
pub mod mock;
pub mod remote;
pub mod resource;
pub mod tracing;
pub mod value;

// Re-export core types for convenience
pub use change::{ChangeSet, Plan};
pub use collection::CollectionReconciler;
pub use config::{ConfigError, EngineConfig, Timeouts};
pub use engine::{ReadOutcome, Reconciler};
pub use error::{MappingError, Phase, ReconcileError, RemoteError, TransitionError};
pub use guard::{CollectionGuard, ReplacementGuard};
pub use id::{IdError, IdPattern, ResourceId, Segment};
pub use lock::{KeyedLocks, LockCoordinator, LockKey, LockSet, NoopLocks};
pub use remote::{PollStatus, Poller, RemoteApi, SecretLister, Submission};
pub use resource::{EmbeddedResource, ManagedResource, Scope};
pub use value::DynamicValue;
