//! Azure Files shares mounted into an environment.
//!
//! The storage account key is write-only and carried over from the prior local model.

use super::differs;
use crate::api::StoragesApi;
use crate::ids::{EnvironmentStorageId, ManagedEnvironmentId};
use crate::wire::{AzureFileProperties, ManagedEnvironmentStorage, StorageProperties};
use async_trait::async_trait;
use reconcile_framework::id::ResourceId;
use reconcile_framework::{
    ManagedResource, MappingError, Plan, ReconcileError, RemoteError, ReplacementGuard, Scope,
    TransitionError,
};
use serde::{Deserialize, Serialize};

const REPLACEMENT_GUARD: ReplacementGuard = ReplacementGuard::new("Environment Storages");

const ACCESS_MODES: [&str; 2] = ["ReadOnly", "ReadWrite"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentStorageModel {
    pub name: String,
    pub container_app_environment_id: String,
    pub account_name: String,
    /// Write-only.
    pub access_key: String,
    pub share_name: String,
    /// `ReadOnly` or `ReadWrite`.
    pub access_mode: String,
}

pub struct EnvironmentStorageResource;

#[async_trait]
impl ManagedResource for EnvironmentStorageResource {
    const RESOURCE_TYPE: &'static str = "Container App Environment Storage";
    type Id = EnvironmentStorageId;
    type Model = EnvironmentStorageModel;
    type Wire = ManagedEnvironmentStorage;
    type Api = dyn StoragesApi;

    fn resource_id(_scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        let environment = ManagedEnvironmentId::parse(&model.container_app_environment_id)?;
        Ok(EnvironmentStorageId::new(
            environment.subscription_id,
            environment.resource_group_name,
            environment.environment_name,
            model.name.clone(),
        ))
    }

    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError> {
        if !ACCESS_MODES.contains(&model.access_mode.as_str()) {
            return Err(MappingError::new(format!(
                "access_mode must be ReadOnly or ReadWrite, got {:?}",
                model.access_mode
            )));
        }
        if model.access_key.is_empty() {
            return Err(MappingError::new("access_key is required"));
        }

        Ok(ManagedEnvironmentStorage {
            properties: Some(StorageProperties {
                azure_file: Some(AzureFileProperties {
                    account_name: Some(model.account_name.clone()),
                    account_key: Some(model.access_key.clone()),
                    share_name: Some(model.share_name.clone()),
                    access_mode: Some(model.access_mode.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(id: &Self::Id, wire: Self::Wire, prior: Option<&Self::Model>) -> Self::Model {
        let azure_file = wire
            .properties
            .and_then(|properties| properties.azure_file)
            .unwrap_or_default();

        EnvironmentStorageModel {
            name: id.storage_name.clone(),
            container_app_environment_id: id.managed_environment_id().to_string(),
            account_name: azure_file.account_name.unwrap_or_default(),
            access_key: prior.map(|prior| prior.access_key.clone()).unwrap_or_default(),
            share_name: azure_file.share_name.unwrap_or_default(),
            access_mode: azure_file.access_mode.unwrap_or_default(),
        }
    }

    async fn resource_secrets(
        _api: &Self::Api,
        _id: &Self::Id,
        wire: &mut Self::Wire,
        prior: Option<&Self::Model>,
    ) -> Result<(), RemoteError> {
        if let Some(prior) = prior {
            azure_file_mut(wire).account_key = Some(prior.access_key.clone());
        }
        Ok(())
    }

    fn apply_changes(wire: &mut Self::Wire, plan: &Plan<Self::Model>) -> Result<(), MappingError> {
        let proposed = &plan.proposed;
        let azure_file = azure_file_mut(wire);
        if plan.has_change("account_name") {
            azure_file.account_name = Some(proposed.account_name.clone());
        }
        if plan.has_change("access_key") {
            azure_file.account_key = Some(proposed.access_key.clone());
        }
        if plan.has_change("share_name") {
            azure_file.share_name = Some(proposed.share_name.clone());
        }
        if plan.has_change("access_mode") {
            azure_file.access_mode = Some(proposed.access_mode.clone());
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

fn azure_file_mut(wire: &mut ManagedEnvironmentStorage) -> &mut AzureFileProperties {
    wire.properties
        .get_or_insert_with(Default::default)
        .azure_file
        .get_or_insert_with(Default::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> EnvironmentStorageModel {
        EnvironmentStorageModel {
            name: "share1".into(),
            container_app_environment_id:
                "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/managedEnvironments/env1".into(),
            account_name: "examplestorage".into(),
            access_key: "c2VjcmV0".into(),
            share_name: "content".into(),
            access_mode: "ReadOnly".into(),
        }
    }

    #[test]
    fn key_survives_a_redacted_read() {
        let model = storage();
        let id = EnvironmentStorageResource::resource_id(&Scope::new("sub"), &model).unwrap();
        let mut wire = EnvironmentStorageResource::expand(&model).unwrap();
        azure_file_mut(&mut wire).account_key = None;

        assert_eq!(EnvironmentStorageResource::flatten(&id, wire, Some(&model)), model);
    }

    #[test]
    fn access_mode_is_validated() {
        let mut model = storage();
        model.access_mode = "WriteOnly".into();
        assert!(EnvironmentStorageResource::expand(&model).is_err());
    }
}
