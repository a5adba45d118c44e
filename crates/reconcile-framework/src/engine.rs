//! # Reconciliation Engine
//!
//! [`Reconciler<R>`] drives one resource kind through Create, Read, Update, Delete and
//! Import against its remote accessor.
//!
//! ## Operations
//!
//! * **Create**:
//!     1. Resolve the identifier from desired state and expand it (validation).
//!     2. Lock the identifier, then any shared parents.
//!     3. Fail with `AlreadyExists` if the object is already there. Existing objects have
//!        to be imported, never adopted.
//!     4. Fill in parent-derived data, write, and wait for the operation to finish.
//!
//! * **Read**: fetch; a missing object is reported as [`ReadOutcome::Gone`], not an
//!   error. Redacted secrets are re-sourced before flattening.
//!
//! * **Update**:
//!     1. Run the diff guard. A refused plan never reaches the remote.
//!     2. Lock, fetch the current object, re-source its secrets.
//!     3. Overwrite only the fields the plan changed, strip read-only fields, write the
//!        full object and wait.
//!
//! * **Delete**: lock, delete, wait. Not-found counts as success.
//!
//! * **Import**: validate the identifier shape, then read. A missing object is an error.
//!
//! Every operation runs under the deadline configured for its phase. When it expires the
//! in-flight future is dropped (releasing its locks) and [`ReconcileError::Timeout`] is
//! returned; the remote outcome is then unknown until the next Read.

use crate::change::Plan;
use crate::config::EngineConfig;
use crate::error::{MappingError, Phase, ReconcileError, RemoteError};
use crate::id::ResourceId;
use crate::lock::{LockCoordinator, LockSet};
use crate::remote::{poll_until_done, PollBackoff, RemoteApi, Submission};
use crate::resource::{ManagedResource, Scope};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a Read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<M> {
    Present(M),
    /// The object no longer exists remotely; local state should drop it.
    Gone,
}

impl<M> ReadOutcome<M> {
    pub fn into_model(self) -> Option<M> {
        match self {
            ReadOutcome::Present(model) => Some(model),
            ReadOutcome::Gone => None,
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, ReadOutcome::Gone)
    }
}

/// What a completed submission should leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Present,
    Gone,
    Anything,
}

/// Run `operation` under `after`, turning expiry into a timeout error.
pub(crate) async fn bounded<T, F>(
    resource_type: &'static str,
    id: &(dyn fmt::Display + Sync),
    phase: Phase,
    after: Duration,
    operation: F,
) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, ReconcileError>>,
{
    match tokio::time::timeout(after, operation).await {
        Ok(result) => result,
        Err(_) => Err(ReconcileError::Timeout {
            resource_type,
            id: id.to_string(),
            phase,
            after,
        }),
    }
}

/// Wait for a submission to finish.
///
/// An `Accepted` submission has nothing to poll, so existence is re-read until it matches
/// `expect`.
pub(crate) async fn settle<I, W, A>(
    api: &A,
    id: &I,
    submission: Submission,
    expect: Expect,
    config: &EngineConfig,
) -> Result<(), RemoteError>
where
    A: RemoteApi<I, W> + ?Sized,
    I: Send + Sync,
    W: Send,
{
    let mut backoff = PollBackoff::new(config.poll_interval, config.max_poll_interval);
    match submission {
        Submission::Completed => Ok(()),
        Submission::Pending(mut poller) => poll_until_done(poller.as_mut(), &mut backoff).await,
        Submission::Accepted if expect == Expect::Anything => Ok(()),
        Submission::Accepted => loop {
            let exists = api.get(id).await?.is_some();
            let settled = match expect {
                Expect::Present => exists,
                Expect::Gone => !exists,
                Expect::Anything => true,
            };
            if settled {
                return Ok(());
            }
            tokio::time::sleep(backoff.next_delay()).await;
        },
    }
}

/// The reconciliation engine for one standalone resource kind.
pub struct Reconciler<R: ManagedResource> {
    api: Arc<R::Api>,
    locks: Arc<dyn LockCoordinator>,
    scope: Scope,
    config: EngineConfig,
    _resource: PhantomData<fn() -> R>,
}

impl<R: ManagedResource> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            locks: self.locks.clone(),
            scope: self.scope.clone(),
            config: self.config.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R: ManagedResource> Reconciler<R> {
    pub fn new(
        api: Arc<R::Api>,
        locks: Arc<dyn LockCoordinator>,
        scope: Scope,
        config: EngineConfig,
    ) -> Self {
        Self {
            api,
            locks,
            scope,
            config,
            _resource: PhantomData,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Create the object described by `desired` and return its identifier.
    pub async fn create(&self, desired: &R::Model) -> Result<R::Id, ReconcileError> {
        let resource_type = R::RESOURCE_TYPE;
        let id = R::resource_id(&self.scope, desired)?;
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

    async fn create_inner(&self, id: &R::Id, desired: &R::Model) -> Result<(), ReconcileError> {
        let mut wire = R::expand(desired).map_err(|e| self.invalid(id, Phase::Create, e))?;

        let mut keys = vec![id.lock_key()];
        keys.extend(R::shared_lock_keys(desired)?);
        let _locks = LockSet::acquire_all(self.locks.as_ref(), keys).await;

        let existing = self
            .api
            .get(id)
            .await
            .map_err(|e| self.remote(id, Phase::Create, e))?;
        if existing.is_some() {
            return Err(ReconcileError::AlreadyExists {
                resource_type: R::RESOURCE_TYPE,
                id: id.to_string(),
            });
        }

        R::prepare_create(self.api.as_ref(), id, desired, &mut wire).await?;

        let submission = self
            .api
            .create_or_update(id, wire)
            .await
            .map_err(|e| self.remote(id, Phase::Create, e))?;
        settle::<R::Id, R::Wire, R::Api>(
            self.api.as_ref(),
            id,
            submission,
            Expect::Present,
            &self.config,
        )
        .await
        .map_err(|e| self.remote(id, Phase::Create, e))
    }

    /// Refresh local state from the remote object.
    ///
    /// `prior` is the last known local model; values the API never returns are carried
    /// over from it.
    pub async fn read(
        &self,
        id: &str,
        prior: Option<&R::Model>,
    ) -> Result<ReadOutcome<R::Model>, ReconcileError> {
        let id = R::Id::parse(id)?;
        self.read_phase(&id, prior, Phase::Read).await
    }

    async fn read_phase(
        &self,
        id: &R::Id,
        prior: Option<&R::Model>,
        phase: Phase,
    ) -> Result<ReadOutcome<R::Model>, ReconcileError> {
        let resource_type = R::RESOURCE_TYPE;
        debug!(resource_type, %id, %phase, "Read");

        let result = bounded(
            resource_type,
            id,
            phase,
            self.config.timeouts.for_phase(phase),
            self.read_inner(id, prior, phase),
        )
        .await;

        match &result {
            Ok(ReadOutcome::Present(_)) => debug!(resource_type, %id, "Read ok"),
            Ok(ReadOutcome::Gone) => info!(resource_type, %id, "Gone, removing from state"),
            Err(e) => warn!(resource_type, %id, error = %e, "Read failed"),
        }
        result
    }

    async fn read_inner(
        &self,
        id: &R::Id,
        prior: Option<&R::Model>,
        phase: Phase,
    ) -> Result<ReadOutcome<R::Model>, ReconcileError> {
        let Some(mut wire) = self.api.get(id).await.map_err(|e| self.remote(id, phase, e))? else {
            return Ok(ReadOutcome::Gone);
        };

        match R::resource_secrets(self.api.as_ref(), id, &mut wire, prior).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(ReadOutcome::Gone),
            Err(e) => return Err(self.remote(id, phase, e)),
        }

        Ok(ReadOutcome::Present(R::flatten(id, wire, prior)))
    }

    /// Compute the change set between `prior` and `proposed` and run the diff guard.
    pub fn plan(
        &self,
        id: &R::Id,
        prior: &R::Model,
        proposed: &R::Model,
    ) -> Result<Plan<R::Model>, ReconcileError> {
        let plan = Plan::new(prior.clone(), proposed.clone())
            .map_err(|e| self.invalid(id, Phase::Update, MappingError::new(e.to_string())))?;

        R::check_transition(&plan).map_err(|source| ReconcileError::UnsafeTransition {
            resource_type: R::RESOURCE_TYPE,
            id: id.to_string(),
            source,
        })?;
        Ok(plan)
    }

    /// Apply the fields that changed between `prior` and `proposed`.
    pub async fn update(
        &self,
        id: &str,
        prior: &R::Model,
        proposed: &R::Model,
    ) -> Result<(), ReconcileError> {
        let resource_type = R::RESOURCE_TYPE;
        let id = R::Id::parse(id)?;
        debug!(resource_type, %id, "Update");

        let result = match self.plan(&id, prior, proposed) {
            Ok(plan) => {
                bounded(
                    resource_type,
                    &id,
                    Phase::Update,
                    self.config.timeouts.update,
                    self.update_inner(&id, plan),
                )
                .await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => info!(resource_type, %id, "Updated"),
            Err(e) => warn!(resource_type, %id, error = %e, "Update failed"),
        }
        result
    }

    async fn update_inner(&self, id: &R::Id, plan: Plan<R::Model>) -> Result<(), ReconcileError> {
        let mut keys = vec![id.lock_key()];
        keys.extend(R::shared_lock_keys(&plan.proposed)?);
        let _locks = LockSet::acquire_all(self.locks.as_ref(), keys).await;

        let mut wire = self
            .api
            .get(id)
            .await
            .map_err(|e| self.remote(id, Phase::Update, e))?
            .ok_or_else(|| self.remote(id, Phase::Update, RemoteError::NotFound))?;

        R::resource_secrets(self.api.as_ref(), id, &mut wire, Some(&plan.prior))
            .await
            .map_err(|e| self.remote(id, Phase::Update, e))?;
        R::apply_changes(&mut wire, &plan).map_err(|e| self.invalid(id, Phase::Update, e))?;
        R::strip_read_only(&mut wire);

        let submission = self
            .api
            .create_or_update(id, wire)
            .await
            .map_err(|e| self.remote(id, Phase::Update, e))?;
        settle::<R::Id, R::Wire, R::Api>(
            self.api.as_ref(),
            id,
            submission,
            Expect::Anything,
            &self.config,
        )
        .await
        .map_err(|e| self.remote(id, Phase::Update, e))
    }

    /// Remove the remote object. Deleting something already gone succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), ReconcileError> {
        let resource_type = R::RESOURCE_TYPE;
        let id = R::Id::parse(id)?;
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

    async fn delete_inner(&self, id: &R::Id) -> Result<(), ReconcileError> {
        let _locks = LockSet::acquire_all(self.locks.as_ref(), [id.lock_key()]).await;

        let submission = match self.api.delete(id).await {
            Ok(submission) => submission,
            Err(e) if e.is_not_found() => {
                debug!(resource_type = R::RESOURCE_TYPE, %id, "Already gone");
                return Ok(());
            }
            Err(e) => return Err(self.remote(id, Phase::Delete, e)),
        };

        let settled = settle::<R::Id, R::Wire, R::Api>(
            self.api.as_ref(),
            id,
            submission,
            Expect::Gone,
            &self.config,
        )
        .await;
        match settled {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.remote(id, Phase::Delete, e)),
        }
    }

    /// Bring an existing remote object under management.
    pub async fn import(&self, id: &str) -> Result<R::Model, ReconcileError> {
        let resource_type = R::RESOURCE_TYPE;
        let id = R::Id::parse(id).inspect_err(|e| {
            warn!(resource_type, error = %e, "Import rejected");
        })?;

        match self.read_phase(&id, None, Phase::Import).await? {
            ReadOutcome::Present(model) => {
                info!(resource_type, %id, "Imported");
                Ok(model)
            }
            ReadOutcome::Gone => Err(self.remote(&id, Phase::Import, RemoteError::NotFound)),
        }
    }

    fn remote(&self, id: &R::Id, phase: Phase, source: RemoteError) -> ReconcileError {
        ReconcileError::remote(R::RESOURCE_TYPE, id, phase, source)
    }

    fn invalid(&self, id: &R::Id, phase: Phase, source: MappingError) -> ReconcileError {
        ReconcileError::invalid(R::RESOURCE_TYPE, id, phase, source)
    }
}
