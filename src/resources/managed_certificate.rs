//! Certificates the platform issues for a hostname once domain control is validated.

use super::{differs, environment_location, expand_tags};
use crate::api::ManagedCertificatesApi;
use crate::ids::{ManagedCertificateId, ManagedEnvironmentId};
use crate::mapper::non_empty;
use crate::wire::{ManagedCertificate, ManagedCertificateProperties, Tags};
use async_trait::async_trait;
use reconcile_framework::id::ResourceId;
use reconcile_framework::{
    ManagedResource, MappingError, Plan, ReconcileError, ReplacementGuard, Scope, TransitionError,
};
use serde::{Deserialize, Serialize};

const VALIDATION_METHODS: [&str; 3] = ["CNAME", "HTTP", "TXT"];

const REPLACEMENT_GUARD: ReplacementGuard = ReplacementGuard::new("Managed Certificates");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedCertificateModel {
    pub name: String,
    pub container_app_environment_id: String,
    pub subject_name: String,
    /// `CNAME`, `HTTP` or `TXT`.
    pub domain_control_validation_type: String,
    pub tags: Tags,

    // Computed
    pub validation_token: String,
}

pub struct ManagedCertificateResource;

#[async_trait]
impl ManagedResource for ManagedCertificateResource {
    const RESOURCE_TYPE: &'static str = "Container App Environment Managed Certificate";
    type Id = ManagedCertificateId;
    type Model = ManagedCertificateModel;
    type Wire = ManagedCertificate;
    type Api = dyn ManagedCertificatesApi;

    fn resource_id(_scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        let environment = ManagedEnvironmentId::parse(&model.container_app_environment_id)?;
        Ok(ManagedCertificateId::new(
            environment.subscription_id,
            environment.resource_group_name,
            environment.environment_name,
            model.name.clone(),
        ))
    }

    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError> {
        if model.subject_name.is_empty() {
            return Err(MappingError::new("subject_name is required"));
        }
        if !VALIDATION_METHODS.contains(&model.domain_control_validation_type.as_str()) {
            return Err(MappingError::new(format!(
                "domain_control_validation_type must be one of {}, got {:?}",
                VALIDATION_METHODS.join(", "),
                model.domain_control_validation_type
            )));
        }

        Ok(ManagedCertificate {
            location: None,
            tags: expand_tags(&model.tags),
            properties: Some(ManagedCertificateProperties {
                subject_name: Some(model.subject_name.clone()),
                domain_control_validation: non_empty(&model.domain_control_validation_type),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(id: &Self::Id, wire: Self::Wire, _prior: Option<&Self::Model>) -> Self::Model {
        let properties = wire.properties.unwrap_or_default();
        ManagedCertificateModel {
            name: id.managed_certificate_name.clone(),
            container_app_environment_id: id.managed_environment_id().to_string(),
            subject_name: properties.subject_name.unwrap_or_default(),
            domain_control_validation_type: properties
                .domain_control_validation
                .unwrap_or_default(),
            tags: wire.tags.unwrap_or_default(),
            validation_token: properties.validation_token.unwrap_or_default(),
        }
    }

    async fn prepare_create(
        api: &Self::Api,
        id: &Self::Id,
        _model: &Self::Model,
        wire: &mut Self::Wire,
    ) -> Result<(), ReconcileError> {
        wire.location = environment_location(api, &id.managed_environment_id()).await?;
        Ok(())
    }

    fn apply_changes(wire: &mut Self::Wire, plan: &Plan<Self::Model>) -> Result<(), MappingError> {
        if plan.has_change("tags") {
            wire.tags = expand_tags(&plan.proposed.tags);
        }
        Ok(())
    }

    fn strip_read_only(wire: &mut Self::Wire) {
        if let Some(properties) = wire.properties.as_mut() {
            properties.provisioning_state = None;
            properties.validation_token = None;
        }
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
            ("subject_name", differs(&prior.subject_name, &proposed.subject_name)),
            (
                "domain_control_validation_type",
                differs(
                    &prior.domain_control_validation_type,
                    &proposed.domain_control_validation_type,
                ),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managed_certificate() -> ManagedCertificateModel {
        ManagedCertificateModel {
            name: "a-example-com".into(),
            container_app_environment_id:
                "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/managedEnvironments/env1".into(),
            subject_name: "a.example.com".into(),
            domain_control_validation_type: "CNAME".into(),
            ..Default::default()
        }
    }

    #[test]
    fn round_trips_through_the_wire_model() {
        let model = managed_certificate();
        let id = ManagedCertificateResource::resource_id(&Scope::new("sub"), &model).unwrap();
        let wire = ManagedCertificateResource::expand(&model).unwrap();
        assert_eq!(ManagedCertificateResource::flatten(&id, wire, None), model);
    }

    #[test]
    fn unknown_validation_method_is_rejected() {
        let mut model = managed_certificate();
        model.domain_control_validation_type = "EMAIL".into();
        let err = ManagedCertificateResource::expand(&model).unwrap_err();
        assert!(err.to_string().contains("\"EMAIL\""));
    }
}
