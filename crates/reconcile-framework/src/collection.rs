//! Reconciler for entries embedded in a parent object's collection.
//!
//! The remote API has no endpoint for the entry itself. Creating or deleting one means
//! fetching the parent, editing its collection and writing the whole parent back, so the
//! parent's lock is held for the full read-modify-write and the parent's redacted secrets
//! are re-sourced before the write. Entry names are compared case-insensitively.

use crate::config::EngineConfig;
use crate::engine::{bounded, settle, Expect, ReadOutcome};
use crate::error::{MappingError, Phase, ReconcileError, RemoteError};
use crate::id::ResourceId;
use crate::lock::{LockCoordinator, LockSet};
use crate::remote::RemoteApi;
use crate::resource::{EmbeddedResource, ManagedResource, ParentId, ParentWire};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

type ParentApi<E> = <<E as EmbeddedResource>::Parent as ManagedResource>::Api;

pub struct CollectionReconciler<E: EmbeddedResource> {
    api: Arc<ParentApi<E>>,
    locks: Arc<dyn LockCoordinator>,
    config: EngineConfig,
    _resource: PhantomData<fn() -> E>,
}

impl<E: EmbeddedResource> Clone for CollectionReconciler<E> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            locks: self.locks.clone(),
            config: self.config.clone(),
            _resource: PhantomData,
        }
    }
}

impl<E: EmbeddedResource> CollectionReconciler<E> {
    pub fn new(
        api: Arc<ParentApi<E>>,
        locks: Arc<dyn LockCoordinator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            api,
            locks,
            config,
            _resource: PhantomData,
        }
    }

    pub async fn create(&self, desired: &E::Model) -> Result<E::Id, ReconcileError> {
        let resource_type = E::RESOURCE_TYPE;
        let id = E::resource_id(desired)?;
        debug!(resource_type, %id, "Create");

        let result = bounded(
            resource_type,
            &id,
            Phase::Create,
            self.config.timeouts.create,
            self.create_inner(&id, desired),
        )
        .await;

        match &result {
            Ok(()) => info!(resource_type, %id, "Created"),
            Err(e) => warn!(resource_type, %id, error = %e, "Create failed"),
        }
        result.map(|()| id)
    }

    async fn create_inner(&self, id: &E::Id, desired: &E::Model) -> Result<(), ReconcileError> {
        let element = E::expand(desired).map_err(|e| self.invalid(id, Phase::Create, e))?;
        let parent_id = E::parent_id(id);

        let mut locks = LockSet::acquire_all(self.locks.as_ref(), [parent_id.lock_key()]).await;
        for key in E::element_lock_keys(&element) {
            locks.acquire(self.locks.as_ref(), key).await;
        }

        let mut parent = self.fetch_parent(&parent_id, Phase::Create).await?.ok_or_else(|| {
            ReconcileError::remote(
                <E::Parent as ManagedResource>::RESOURCE_TYPE,
                &parent_id,
                Phase::Create,
                RemoteError::NotFound,
            )
        })?;

        if position::<E>(&parent, E::name(id)).is_some() {
            return Err(ReconcileError::AlreadyExists {
                resource_type: E::RESOURCE_TYPE,
                id: id.to_string(),
            });
        }

        <E::Parent as ManagedResource>::resource_secrets(
            self.api.as_ref(),
            &parent_id,
            &mut parent,
            None,
        )
        .await
        .map_err(|e| self.parent_remote(&parent_id, Phase::Create, e))?;
        E::collection_mut(&mut parent)
            .map_err(|e| self.invalid(id, Phase::Create, e))?
            .push(element);

        self.write_parent(&parent_id, parent, Phase::Create).await
    }

    pub async fn read(&self, id: &str) -> Result<ReadOutcome<E::Model>, ReconcileError> {
        let id = E::Id::parse(id)?;
        self.read_phase(&id, Phase::Read).await
    }

    async fn read_phase(
        &self,
        id: &E::Id,
        phase: Phase,
    ) -> Result<ReadOutcome<E::Model>, ReconcileError> {
        let resource_type = E::RESOURCE_TYPE;
        debug!(resource_type, %id, %phase, "Read");

        let timeout = self.config.timeouts.for_phase(phase);
        let result = bounded(resource_type, id, phase, timeout, async {
            let parent_id = E::parent_id(id);
            let Some(parent) = self.fetch_parent(&parent_id, phase).await? else {
                return Ok(ReadOutcome::Gone);
            };
            Ok(match position::<E>(&parent, E::name(id)) {
                Some(index) => ReadOutcome::Present(E::flatten(id, &E::collection(&parent)[index])),
                None => ReadOutcome::Gone,
            })
        })
        .await;

        match &result {
            Ok(ReadOutcome::Present(_)) => debug!(resource_type, %id, "Read ok"),
            Ok(ReadOutcome::Gone) => info!(resource_type, %id, "Gone, removing from state"),
            Err(e) => warn!(resource_type, %id, error = %e, "Read failed"),
        }
        result
    }

    pub async fn delete(&self, id: &str) -> Result<(), ReconcileError> {
        let resource_type = E::RESOURCE_TYPE;
        let id = E::Id::parse(id)?;
        debug!(resource_type, %id, "Delete");

        let result = bounded(
            resource_type,
            &id,
            Phase::Delete,
            self.config.timeouts.delete,
            self.delete_inner(&id),
        )
        .await;

        match &result {
            Ok(()) => info!(resource_type, %id, "Deleted"),
            Err(e) => warn!(resource_type, %id, error = %e, "Delete failed"),
        }
        result
    }

    async fn delete_inner(&self, id: &E::Id) -> Result<(), ReconcileError> {
        let parent_id = E::parent_id(id);
        let mut locks = LockSet::acquire_all(self.locks.as_ref(), [parent_id.lock_key()]).await;

        let Some(mut parent) = self.fetch_parent(&parent_id, Phase::Delete).await? else {
            debug!(resource_type = E::RESOURCE_TYPE, %id, "Parent already gone");
            return Ok(());
        };
        let Some(index) = position::<E>(&parent, E::name(id)) else {
            debug!(resource_type = E::RESOURCE_TYPE, %id, "Already gone");
            return Ok(());
        };

        for key in E::element_lock_keys(&E::collection(&parent)[index]) {
            locks.acquire(self.locks.as_ref(), key).await;
        }

        <E::Parent as ManagedResource>::resource_secrets(
            self.api.as_ref(),
            &parent_id,
            &mut parent,
            None,
        )
        .await
        .map_err(|e| self.parent_remote(&parent_id, Phase::Delete, e))?;
        E::collection_mut(&mut parent)
            .map_err(|e| self.invalid(id, Phase::Delete, e))?
            .remove(index);

        self.write_parent(&parent_id, parent, Phase::Delete).await
    }

    pub async fn import(&self, id: &str) -> Result<E::Model, ReconcileError> {
        let resource_type = E::RESOURCE_TYPE;
        let id = E::Id::parse(id).inspect_err(|e| {
            warn!(resource_type, error = %e, "Import rejected");
        })?;

        match self.read_phase(&id, Phase::Import).await? {
            ReadOutcome::Present(model) => {
                info!(resource_type, %id, "Imported");
                Ok(model)
            }
            ReadOutcome::Gone => Err(ReconcileError::remote(
                resource_type,
                &id,
                Phase::Import,
                RemoteError::NotFound,
            )),
        }
    }

    async fn fetch_parent(
        &self,
        parent_id: &ParentId<E>,
        phase: Phase,
    ) -> Result<Option<ParentWire<E>>, ReconcileError> {
        self.api
            .get(parent_id)
            .await
            .map_err(|e| self.parent_remote(parent_id, phase, e))
    }

    async fn write_parent(
        &self,
        parent_id: &ParentId<E>,
        mut parent: ParentWire<E>,
        phase: Phase,
    ) -> Result<(), ReconcileError> {
        <E::Parent as ManagedResource>::strip_read_only(&mut parent);
        <E::Parent as ManagedResource>::prepare_rewrite(&mut parent);

        let submission = self
            .api
            .create_or_update(parent_id, parent)
            .await
            .map_err(|e| self.parent_remote(parent_id, phase, e))?;
        settle::<ParentId<E>, ParentWire<E>, ParentApi<E>>(
            self.api.as_ref(),
            parent_id,
            submission,
            Expect::Anything,
            &self.config,
        )
        .await
        .map_err(|e| self.parent_remote(parent_id, phase, e))
    }

    fn parent_remote(
        &self,
        parent_id: &ParentId<E>,
        phase: Phase,
        source: RemoteError,
    ) -> ReconcileError {
        let parent_type = <E::Parent as ManagedResource>::RESOURCE_TYPE;
        ReconcileError::remote(parent_type, parent_id, phase, source)
    }

    fn invalid(&self, id: &E::Id, phase: Phase, source: MappingError) -> ReconcileError {
        ReconcileError::invalid(E::RESOURCE_TYPE, id, phase, source)
    }
}

fn position<E: EmbeddedResource>(parent: &ParentWire<E>, name: &str) -> Option<usize> {
    E::collection(parent)
        .iter()
        .position(|element| E::element_name(element).eq_ignore_ascii_case(name))
}
