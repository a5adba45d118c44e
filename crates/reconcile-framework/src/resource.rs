//! # Resource Contracts
//!
//! The engine is written once and works for any resource kind that implements one of
//! the two traits here:
//!
//! - [`ManagedResource`] for objects that live at their own remote identifier.
//! - [`EmbeddedResource`] for entries stored inside a parent object's collection and only
//!   writable by rewriting the whole parent.
//!
//! Associated types bind each kind to its identifier, local model and wire model, so a
//! Container App reconciler cannot be handed a Job model by mistake.
//!
//! # Provided Methods (Hooks)
//!
//! Most hooks have a do-nothing default. A kind overrides only what its remote API
//! requires:
//!
//! - [`ManagedResource::prepare_create`] for data that has to be looked up on a parent
//!   (for example the location of the environment an app runs in).
//! - [`ManagedResource::resource_secrets`] when the API never returns secret values on
//!   GET, so a fetched object must be completed before it can be written back.
//! - [`ManagedResource::strip_read_only`] and [`ManagedResource::prepare_rewrite`] for
//!   fields the API rejects when they are echoed back.
//! - [`ManagedResource::check_transition`] for changes that must be refused before any
//!   remote call (the diff guard).

use crate::change::Plan;
use crate::error::{MappingError, ReconcileError, RemoteError, TransitionError};
use crate::id::ResourceId;
use crate::lock::LockKey;
use crate::remote::RemoteApi;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;

/// Provider-level context needed to address objects from desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub subscription_id: String,
}

impl Scope {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
        }
    }
}

/// A resource kind stored at its own remote identifier.
#[async_trait]
pub trait ManagedResource: Send + Sync + 'static {
    /// Human readable kind, used in errors and logs.
    const RESOURCE_TYPE: &'static str;

    type Id: ResourceId;

    /// The local (desired/observed) state.
    type Model: Clone + Debug + Serialize + Send + Sync + 'static;

    /// The remote API's representation.
    type Wire: Clone + Debug + Send + Sync + 'static;

    /// The accessor this kind needs. Usually a trait object combining `RemoteApi` with
    /// secret listing or parent lookups.
    type Api: ?Sized + RemoteApi<Self::Id, Self::Wire> + Send + Sync + 'static;

    /// The identifier the desired state addresses.
    fn resource_id(scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError>;

    /// Identifiers of shared parents this kind's writes must also hold.
    fn shared_lock_keys(_model: &Self::Model) -> Result<Vec<LockKey>, ReconcileError> {
        Ok(Vec::new())
    }

    /// Local model to wire model. Validation failures are reported here.
    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError>;

    /// Wire model to local model.
    ///
    /// `prior` is the last known local model, the only source for write-only values the
    /// API never returns.
    fn flatten(id: &Self::Id, wire: Self::Wire, prior: Option<&Self::Model>) -> Self::Model;

    /// Complete a freshly expanded model with data held by parents.
    async fn prepare_create(
        _api: &Self::Api,
        _id: &Self::Id,
        _model: &Self::Model,
        _wire: &mut Self::Wire,
    ) -> Result<(), ReconcileError> {
        Ok(())
    }

    /// Put back secret values a GET redacted.
    async fn resource_secrets(
        _api: &Self::Api,
        _id: &Self::Id,
        _wire: &mut Self::Wire,
        _prior: Option<&Self::Model>,
    ) -> Result<(), RemoteError> {
        Ok(())
    }

    /// Overwrite the fetched wire model with the fields the plan changed.
    fn apply_changes(wire: &mut Self::Wire, plan: &Plan<Self::Model>) -> Result<(), MappingError>;

    /// Remove server-computed fields before a write.
    fn strip_read_only(_wire: &mut Self::Wire) {}

    /// Remove write-once fields before the object is rewritten without a desired-state
    /// change (e.g. when an embedded entry is added).
    fn prepare_rewrite(_wire: &mut Self::Wire) {}

    /// Refuse a transition the remote service cannot perform safely.
    fn check_transition(_plan: &Plan<Self::Model>) -> Result<(), TransitionError> {
        Ok(())
    }
}

/// Shorthand for the parent wire model of an embedded kind.
pub type ParentWire<E> = <<E as EmbeddedResource>::Parent as ManagedResource>::Wire;

/// Shorthand for the parent identifier of an embedded kind.
pub type ParentId<E> = <<E as EmbeddedResource>::Parent as ManagedResource>::Id;

/// A resource kind that is an entry in a parent object's collection.
///
/// It has an identifier of its own, but every write is a full rewrite of the parent.
pub trait EmbeddedResource: Send + Sync + 'static {
    const RESOURCE_TYPE: &'static str;

    type Id: ResourceId;
    type Model: Clone + Debug + Serialize + Send + Sync + 'static;
    type Parent: ManagedResource;
    type Element: Clone + Debug + Send + Sync + 'static;

    fn resource_id(model: &Self::Model) -> Result<Self::Id, ReconcileError>;

    fn parent_id(id: &Self::Id) -> ParentId<Self>;

    /// The entry name carried by the identifier.
    fn name(id: &Self::Id) -> &str;

    fn element_name(element: &Self::Element) -> &str;

    /// Shared identifiers an entry refers to, locked after the parent.
    fn element_lock_keys(_element: &Self::Element) -> Vec<LockKey> {
        Vec::new()
    }

    /// The collection on a fetched parent. Absent collections are empty.
    fn collection(parent: &ParentWire<Self>) -> &[Self::Element];

    /// Mutable access to the collection, creating it when the parent allows.
    fn collection_mut(
        parent: &mut ParentWire<Self>,
    ) -> Result<&mut Vec<Self::Element>, MappingError>;

    fn expand(model: &Self::Model) -> Result<Self::Element, MappingError>;

    fn flatten(id: &Self::Id, element: &Self::Element) -> Self::Model;
}
