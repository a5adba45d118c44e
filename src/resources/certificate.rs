//! Certificates uploaded to an environment.
//!
//! The blob and its password are write-only. Reads and full writes take them from the
//! last known local model. Uploading a different blob means creating a new certificate.

use super::{differs, environment_location, expand_tags};
use crate::api::CertificatesApi;
use crate::ids::{CertificateId, ManagedEnvironmentId};
use crate::wire::{Certificate, CertificateProperties, Tags};
use async_trait::async_trait;
use reconcile_framework::id::ResourceId;
use reconcile_framework::{
    ManagedResource, MappingError, Plan, ReconcileError, RemoteError, ReplacementGuard, Scope,
    TransitionError,
};
use serde::{Deserialize, Serialize};

const REPLACEMENT_GUARD: ReplacementGuard =
    ReplacementGuard::new("Container App Environment Certificates");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateModel {
    pub name: String,
    pub container_app_environment_id: String,
    /// Write-only.
    pub certificate_blob_base64: String,
    /// Write-only.
    pub certificate_password: String,
    pub tags: Tags,

    // Computed
    pub subject_name: String,
    pub issuer: String,
    pub issue_date: String,
    pub expiration_date: String,
    pub thumbprint: String,
}

pub struct CertificateResource;

#[async_trait]
impl ManagedResource for CertificateResource {
    const RESOURCE_TYPE: &'static str = "Container App Environment Certificate";
    type Id = CertificateId;
    type Model = CertificateModel;
    type Wire = Certificate;
    type Api = dyn CertificatesApi;

    fn resource_id(_scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        let environment = ManagedEnvironmentId::parse(&model.container_app_environment_id)?;
        Ok(CertificateId::new(
            environment.subscription_id,
            environment.resource_group_name,
            environment.environment_name,
            model.name.clone(),
        ))
    }

    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError> {
        if model.certificate_blob_base64.is_empty() {
            return Err(MappingError::new("certificate_blob_base64 is required"));
        }

        Ok(Certificate {
            location: None,
            tags: expand_tags(&model.tags),
            properties: Some(CertificateProperties {
                value: Some(model.certificate_blob_base64.clone()),
                password: Some(model.certificate_password.clone()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(id: &Self::Id, wire: Self::Wire, prior: Option<&Self::Model>) -> Self::Model {
        let properties = wire.properties.unwrap_or_default();
        let (certificate_blob_base64, certificate_password) = prior
            .map(|prior| {
                (prior.certificate_blob_base64.clone(), prior.certificate_password.clone())
            })
            .unwrap_or_default();

        CertificateModel {
            name: id.certificate_name.clone(),
            container_app_environment_id: id.managed_environment_id().to_string(),
            certificate_blob_base64,
            certificate_password,
            tags: wire.tags.unwrap_or_default(),
            subject_name: properties.subject_name.unwrap_or_default(),
            issuer: properties.issuer.unwrap_or_default(),
            issue_date: properties.issue_date.unwrap_or_default(),
            expiration_date: properties.expiration_date.unwrap_or_default(),
            thumbprint: properties.thumbprint.unwrap_or_default(),
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

    async fn resource_secrets(
        _api: &Self::Api,
        _id: &Self::Id,
        wire: &mut Self::Wire,
        prior: Option<&Self::Model>,
    ) -> Result<(), RemoteError> {
        if let Some(prior) = prior {
            let properties = wire.properties.get_or_insert_with(Default::default);
            properties.value = Some(prior.certificate_blob_base64.clone());
            properties.password = Some(prior.certificate_password.clone());
        }
        Ok(())
    }

    fn apply_changes(wire: &mut Self::Wire, plan: &Plan<Self::Model>) -> Result<(), MappingError> {
        let proposed = &plan.proposed;
        if plan.has_change("tags") {
            wire.tags = expand_tags(&proposed.tags);
        }
        // Imported without a blob; the desired one is the only value there is.
        if plan.prior.certificate_blob_base64.is_empty() {
            let properties = wire.properties.get_or_insert_with(Default::default);
            properties.value = Some(proposed.certificate_blob_base64.clone());
            properties.password = Some(proposed.certificate_password.clone());
        }
        Ok(())
    }

    fn strip_read_only(wire: &mut Self::Wire) {
        if let Some(properties) = wire.properties.as_mut() {
            properties.provisioning_state = None;
            properties.subject_name = None;
            properties.issuer = None;
            properties.issue_date = None;
            properties.expiration_date = None;
            properties.thumbprint = None;
            properties.valid = None;
        }
    }

    /// An imported certificate has no known blob, so its blob and password are not compared.
    fn check_transition(plan: &Plan<Self::Model>) -> Result<(), TransitionError> {
        let (prior, proposed) = (&plan.prior, &plan.proposed);
        let blob_known = !prior.certificate_blob_base64.is_empty();
        REPLACEMENT_GUARD.check([
            ("name", differs(&prior.name, &proposed.name)),
            (
                "container_app_environment_id",
                differs(
                    &prior.container_app_environment_id,
                    &proposed.container_app_environment_id,
                ),
            ),
            (
                "certificate_blob_base64",
                blob_known && prior.certificate_blob_base64 != proposed.certificate_blob_base64,
            ),
            (
                "certificate_password",
                blob_known && prior.certificate_password != proposed.certificate_password,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certificate() -> CertificateModel {
        CertificateModel {
            name: "cert1".into(),
            container_app_environment_id:
                "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/managedEnvironments/env1".into(),
            certificate_blob_base64: "MIIJ...".into(),
            certificate_password: "hunter2".into(),
            ..Default::default()
        }
    }

    #[test]
    fn identifier_nests_under_the_environment() {
        let id = CertificateResource::resource_id(&Scope::new("ignored"), &certificate()).unwrap();
        assert_eq!(
            id.format_id(),
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/managedEnvironments/env1/certificates/cert1"
        );
    }

    #[test]
    fn blob_and_password_come_from_prior_state() {
        let id = CertificateResource::resource_id(&Scope::new("sub"), &certificate()).unwrap();
        let redacted = Certificate {
            properties: Some(CertificateProperties {
                thumbprint: Some("ABC123".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let flattened = CertificateResource::flatten(&id, redacted, Some(&certificate()));
        assert_eq!(flattened.certificate_blob_base64, "MIIJ...");
        assert_eq!(flattened.certificate_password, "hunter2");
        assert_eq!(flattened.thumbprint, "ABC123");
    }

    #[test]
    fn new_certificate_material_is_refused() {
        let mut proposed = certificate();
        proposed.certificate_blob_base64 = "MIIK...".into();
        let plan = Plan::new(certificate(), proposed).unwrap();

        let err = CertificateResource::check_transition(&plan).unwrap_err();
        assert_eq!(err.names, vec!["certificate_blob_base64"]);
        assert!(err.message.contains("delete the resource and create it again"));
    }

    #[test]
    fn imported_certificates_adopt_the_declared_blob() {
        let mut imported = certificate();
        imported.certificate_blob_base64.clear();
        imported.certificate_password.clear();
        let plan = Plan::new(imported, certificate()).unwrap();
        assert!(CertificateResource::check_transition(&plan).is_ok());

        let mut wire = Certificate::default();
        CertificateResource::apply_changes(&mut wire, &plan).unwrap();
        let properties = wire.properties.unwrap();
        assert_eq!(properties.value.as_deref(), Some("MIIJ..."));
        assert_eq!(properties.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn blob_is_required() {
        let mut model = certificate();
        model.certificate_blob_base64.clear();
        assert!(CertificateResource::expand(&model).is_err());
    }
}
