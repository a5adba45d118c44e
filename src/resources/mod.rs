//! # Resource Kinds
//!
//! One module per kind of the `Microsoft.App` family. Each pairs a local model with the
//! wire model it maps to and implements [`ManagedResource`] (or, for custom domains,
//! [`EmbeddedResource`]) so the generic engine can reconcile it.
//!
//! | Kind | Secret-bearing fields come from |
//! |---|---|
//! | Managed Environment | prior local model (log analytics shared key) |
//! | Container App | `listSecrets` |
//! | Container App Job | `listSecrets` |
//! | Environment Certificate | prior local model (blob, password) |
//! | Managed Certificate | none |
//! | Dapr Component | `listSecrets` |
//! | Environment Storage | prior local model (account key) |
//! | Custom Domain | parent app's `listSecrets` before the app is rewritten |
//!
//! [`ManagedResource`]: reconcile_framework::ManagedResource
//! [`EmbeddedResource`]: reconcile_framework::EmbeddedResource

pub mod certificate;
pub mod container_app;
pub mod custom_domain;
pub mod dapr_component;
pub mod environment;
pub mod job;
pub mod managed_certificate;
pub mod storage;

pub use certificate::{CertificateModel, CertificateResource};
pub use container_app::{ContainerAppModel, ContainerAppResource};
pub use custom_domain::{ContainerAppCustomDomainModel, CustomDomainResource};
pub use dapr_component::{DaprComponentModel, DaprComponentResource, DaprMetadataModel};
pub use environment::{ManagedEnvironmentModel, ManagedEnvironmentResource};
pub use job::{
    EventTriggerModel, JobModel, JobResource, JobTemplateModel, ManualTriggerModel,
    ScheduleTriggerModel,
};
pub use managed_certificate::{ManagedCertificateModel, ManagedCertificateResource};
pub use storage::{EnvironmentStorageModel, EnvironmentStorageResource};

use crate::ids::ManagedEnvironmentId;
use crate::wire::{ManagedEnvironment, Tags};
use reconcile_framework::id::ResourceId;
use reconcile_framework::{MappingError, Phase, ReconcileError, RemoteApi, RemoteError};

pub(crate) fn expand_tags(tags: &Tags) -> Option<Tags> {
    (!tags.is_empty()).then(|| tags.clone())
}

/// Environment references are user input and parsed strictly.
pub(crate) fn parse_environment_id(raw: &str) -> Result<ManagedEnvironmentId, MappingError> {
    ManagedEnvironmentId::parse(raw)
        .map_err(|e| MappingError::new(format!("parsing container_app_environment_id: {e}")))
}

/// Environment references echoed by the API may come back in other casing.
pub(crate) fn normalize_environment_id(raw: Option<String>) -> String {
    let raw = raw.unwrap_or_default();
    ManagedEnvironmentId::parse_insensitively(&raw)
        .map(|id| id.to_string())
        .unwrap_or(raw)
}

/// Names and identifiers compare case-insensitively.
pub(crate) fn differs(prior: &str, proposed: &str) -> bool {
    !prior.eq_ignore_ascii_case(proposed)
}

/// `West Europe` and `westeurope` name the same region.
pub(crate) fn location_differs(prior: &str, proposed: &str) -> bool {
    let normalize = |location: &str| location.replace(' ', "").to_ascii_lowercase();
    normalize(prior) != normalize(proposed)
}

/// The location of the environment a new object is created in.
pub(crate) async fn environment_location<A>(
    api: &A,
    environment_id: &ManagedEnvironmentId,
) -> Result<Option<String>, ReconcileError>
where
    A: ?Sized + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>,
{
    let environment = api
        .get(environment_id)
        .await
        .map_err(|e| environment_error(environment_id, e))?
        .ok_or_else(|| environment_error(environment_id, RemoteError::NotFound))?;
    Ok(environment.location)
}

fn environment_error(environment_id: &ManagedEnvironmentId, source: RemoteError) -> ReconcileError {
    ReconcileError::remote(ManagedEnvironmentId::KIND, environment_id, Phase::Create, source)
}
