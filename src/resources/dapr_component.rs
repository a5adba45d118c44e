//! Dapr components shared by the apps of an environment.

use super::differs;
use crate::api::DaprComponentsApi;
use crate::ids::{DaprComponentId, ManagedEnvironmentId};
use crate::mapper::secret::{expand_secrets, flatten_secrets};
use crate::mapper::{non_empty, non_empty_vec, SecretModel};
use crate::wire::{DaprComponent, DaprComponentProperties, DaprMetadata};
use async_trait::async_trait;
use reconcile_framework::id::ResourceId;
use reconcile_framework::{
    ManagedResource, MappingError, Plan, ReconcileError, RemoteError, ReplacementGuard, Scope,
    TransitionError,
};
use serde::{Deserialize, Serialize};

const REPLACEMENT_GUARD: ReplacementGuard = ReplacementGuard::new("Dapr Components");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaprComponentModel {
    pub name: String,
    pub container_app_environment_id: String,
    /// e.g. `state.azure.blobstorage`
    pub component_type: String,
    pub version: String,
    pub ignore_errors: bool,
    pub init_timeout: String,
    pub secret_store_name: String,
    pub secrets: Vec<SecretModel>,
    pub metadata: Vec<DaprMetadataModel>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaprMetadataModel {
    pub name: String,
    pub value: String,
    pub secret_name: String,
}

pub struct DaprComponentResource;

#[async_trait]
impl ManagedResource for DaprComponentResource {
    const RESOURCE_TYPE: &'static str = "Container App Environment Dapr Component";
    type Id = DaprComponentId;
    type Model = DaprComponentModel;
    type Wire = DaprComponent;
    type Api = dyn DaprComponentsApi;

    fn resource_id(_scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        let environment = ManagedEnvironmentId::parse(&model.container_app_environment_id)?;
        Ok(DaprComponentId::new(
            environment.subscription_id,
            environment.resource_group_name,
            environment.environment_name,
            model.name.clone(),
        ))
    }

    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError> {
        if model.component_type.is_empty() || model.version.is_empty() {
            return Err(MappingError::new("component_type and version are required"));
        }
        for entry in &model.metadata {
            if !entry.value.is_empty() && !entry.secret_name.is_empty() {
                return Err(MappingError::new(format!(
                    "metadata {:?}: value and secret_name are mutually exclusive",
                    entry.name
                )));
            }
        }

        Ok(DaprComponent {
            properties: Some(DaprComponentProperties {
                component_type: Some(model.component_type.clone()),
                version: Some(model.version.clone()),
                ignore_errors: Some(model.ignore_errors),
                init_timeout: non_empty(&model.init_timeout),
                secret_store_component: non_empty(&model.secret_store_name),
                secrets: expand_secrets(&model.secrets),
                metadata: expand_metadata(&model.metadata),
                scopes: non_empty_vec(model.scopes.clone()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(id: &Self::Id, wire: Self::Wire, _prior: Option<&Self::Model>) -> Self::Model {
        let properties = wire.properties.unwrap_or_default();
        DaprComponentModel {
            name: id.dapr_component_name.clone(),
            container_app_environment_id: id.managed_environment_id().to_string(),
            component_type: properties.component_type.unwrap_or_default(),
            version: properties.version.unwrap_or_default(),
            ignore_errors: properties.ignore_errors.unwrap_or_default(),
            init_timeout: properties.init_timeout.unwrap_or_default(),
            secret_store_name: properties.secret_store_component.unwrap_or_default(),
            secrets: flatten_secrets(properties.secrets),
            metadata: properties
                .metadata
                .unwrap_or_default()
                .into_iter()
                .map(|entry| DaprMetadataModel {
                    name: entry.name.unwrap_or_default(),
                    value: entry.value.unwrap_or_default(),
                    secret_name: entry.secret_ref.unwrap_or_default(),
                })
                .collect(),
            scopes: properties.scopes.unwrap_or_default(),
        }
    }

    async fn resource_secrets(
        api: &Self::Api,
        id: &Self::Id,
        wire: &mut Self::Wire,
        _prior: Option<&Self::Model>,
    ) -> Result<(), RemoteError> {
        let secrets = api.list_secrets(id).await?;
        wire.properties_mut().secrets = non_empty_vec(secrets);
        Ok(())
    }

    fn apply_changes(wire: &mut Self::Wire, plan: &Plan<Self::Model>) -> Result<(), MappingError> {
        let proposed = &plan.proposed;
        let expanded = Self::expand(proposed)?.properties.unwrap_or_default();
        let properties = wire.properties_mut();

        if plan.has_change("component_type") {
            properties.component_type = expanded.component_type;
        }
        if plan.has_change("version") {
            properties.version = expanded.version;
        }
        if plan.has_change("ignore_errors") {
            properties.ignore_errors = expanded.ignore_errors;
        }
        if plan.has_change("init_timeout") {
            properties.init_timeout = expanded.init_timeout;
        }
        if plan.has_change("secret_store_name") {
            properties.secret_store_component = expanded.secret_store_component;
        }
        if plan.has_change("secrets") {
            properties.secrets = expanded.secrets;
        }
        if plan.has_change("metadata") {
            properties.metadata = expanded.metadata;
        }
        if plan.has_change("scopes") {
            properties.scopes = expanded.scopes;
        }
        Ok(())
    }

    fn check_transition(plan: &Plan<Self::Model>) -> Result<(), TransitionError> {
        let (prior, proposed) = (&plan.prior, &plan.proposed);
        REPLACEMENT_GUARD.check([
            ("name", differs(&prior.name, &proposed.name)),
            (
                "container_app_environment_id",
                differs(
                    &prior.container_app_environment_id,
                    &proposed.container_app_environment_id,
                ),
            ),
        ])
    }
}

fn expand_metadata(input: &[DaprMetadataModel]) -> Option<Vec<DaprMetadata>> {
    non_empty_vec(
        input
            .iter()
            .map(|entry| DaprMetadata {
                name: Some(entry.name.clone()),
                value: non_empty(&entry.value),
                secret_ref: non_empty(&entry.secret_name),
            })
            .collect(),
    )
}
