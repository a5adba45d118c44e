//! # Custom Domains
//!
//! A hostname bound to a Container App. The service has no endpoint for bindings: they
//! are entries in the app's `configuration.ingress.customDomains`, so every create and
//! delete is a full rewrite of the app. The collection engine holds the app's lock for
//! the whole read-modify-write, and the certificate's lock after it, so concurrent
//! bindings on the same app or certificate are applied one at a time.

use super::ContainerAppResource;
use crate::ids::{AnyCertificateId, ContainerAppId, CustomDomainId};
use crate::mapper::non_empty;
use crate::wire::{ContainerApp, CustomDomain};
use reconcile_framework::id::ResourceId;
use reconcile_framework::{EmbeddedResource, LockKey, MappingError, ReconcileError};
use serde::{Deserialize, Serialize};

const SNI_ENABLED: &str = "SniEnabled";
const DISABLED: &str = "Disabled";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerAppCustomDomainModel {
    pub container_app_id: String,
    /// The hostname.
    pub name: String,
    /// `SniEnabled` or `Disabled`. Defaults from whether a certificate is given.
    pub certificate_binding_type: String,
    pub container_app_environment_certificate_id: String,
    pub container_app_environment_managed_certificate_id: String,
}

impl ContainerAppCustomDomainModel {
    pub fn new(container_app_id: &ContainerAppId, hostname: impl Into<String>) -> Self {
        Self {
            container_app_id: container_app_id.to_string(),
            name: hostname.into(),
            ..Default::default()
        }
    }

    fn certificate_id(&self) -> Option<&str> {
        [
            &self.container_app_environment_certificate_id,
            &self.container_app_environment_managed_certificate_id,
        ]
        .into_iter()
        .find(|id| !id.is_empty())
        .map(String::as_str)
    }
}

pub struct CustomDomainResource;

impl EmbeddedResource for CustomDomainResource {
    const RESOURCE_TYPE: &'static str = "Container App Custom Domain";
    type Id = CustomDomainId;
    type Model = ContainerAppCustomDomainModel;
    type Parent = ContainerAppResource;
    type Element = CustomDomain;

    fn resource_id(model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        let app = ContainerAppId::parse(&model.container_app_id)?;
        Ok(app.custom_domain(model.name.clone()))
    }

    fn parent_id(id: &Self::Id) -> ContainerAppId {
        id.container_app_id()
    }

    fn name(id: &Self::Id) -> &str {
        &id.custom_domain_name
    }

    fn element_name(element: &Self::Element) -> &str {
        &element.name
    }

    fn element_lock_keys(element: &Self::Element) -> Vec<LockKey> {
        let Some(raw) = element.certificate_id.as_deref().filter(|raw| !raw.is_empty()) else {
            return Vec::new();
        };
        let key = match AnyCertificateId::parse_insensitively(raw) {
            Some(id) => LockKey::new(id.to_string()),
            None => LockKey::new(raw),
        };
        vec![key]
    }

    fn collection(parent: &ContainerApp) -> &[Self::Element] {
        parent
            .ingress()
            .and_then(|ingress| ingress.custom_domains.as_deref())
            .unwrap_or(&[])
    }

    fn collection_mut(parent: &mut ContainerApp) -> Result<&mut Vec<Self::Element>, MappingError> {
        let ingress = parent
            .properties
            .as_mut()
            .and_then(|properties| properties.configuration.as_mut())
            .and_then(|configuration| configuration.ingress.as_mut())
            .ok_or_else(|| {
                MappingError::new(
                    "the Container App must have ingress enabled to bind a custom domain",
                )
            })?;
        Ok(ingress.custom_domains.get_or_insert_with(Vec::new))
    }

    fn expand(model: &Self::Model) -> Result<Self::Element, MappingError> {
        if !model.container_app_environment_certificate_id.is_empty()
            && !model.container_app_environment_managed_certificate_id.is_empty()
        {
            return Err(MappingError::new(
                "only one of container_app_environment_certificate_id and container_app_environment_managed_certificate_id may be set",
            ));
        }
        let certificate_id = model.certificate_id();
        if let Some(raw) = certificate_id {
            if AnyCertificateId::parse_insensitively(raw).is_none() {
                return Err(MappingError::new(format!("{raw:?} is not a certificate identifier")));
            }
        }

        let binding_type = match (model.certificate_binding_type.as_str(), certificate_id) {
            ("", Some(_)) => SNI_ENABLED.to_string(),
            ("", None) => DISABLED.to_string(),
            (explicit, _) => explicit.to_string(),
        };
        if binding_type == SNI_ENABLED && certificate_id.is_none() {
            return Err(MappingError::new(
                "certificate_binding_type SniEnabled requires a certificate",
            ));
        }

        Ok(CustomDomain {
            name: model.name.clone(),
            binding_type: Some(binding_type),
            certificate_id: certificate_id.and_then(non_empty),
        })
    }

    fn flatten(id: &Self::Id, element: &Self::Element) -> Self::Model {
        let mut model = ContainerAppCustomDomainModel {
            container_app_id: id.container_app_id().to_string(),
            name: id.custom_domain_name.clone(),
            certificate_binding_type: element.binding_type.clone().unwrap_or_default(),
            ..Default::default()
        };

        let raw = element.certificate_id.clone().unwrap_or_default();
        match AnyCertificateId::parse_insensitively(&raw) {
            Some(AnyCertificateId::Managed(certificate)) => {
                model.container_app_environment_managed_certificate_id = certificate.to_string()
            }
            Some(AnyCertificateId::Environment(certificate)) => {
                model.container_app_environment_certificate_id = certificate.to_string()
            }
            None => model.container_app_environment_certificate_id = raw,
        }
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str =
        "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/containerApps/foo";
    const CERTIFICATE: &str =
        "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/managedEnvironments/env1/certificates/cert1";
    const MANAGED: &str =
        "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/managedEnvironments/env1/managedCertificates/mc1";

    fn binding(certificate: &str) -> ContainerAppCustomDomainModel {
        ContainerAppCustomDomainModel {
            container_app_id: APP.into(),
            name: "a.example.com".into(),
            container_app_environment_certificate_id: certificate.into(),
            ..Default::default()
        }
    }

    #[test]
    fn identifier_nests_under_the_app() {
        let id = CustomDomainResource::resource_id(&binding(CERTIFICATE)).unwrap();
        assert_eq!(id.to_string(), format!("{APP}/customDomainName/a.example.com"));
        assert_eq!(CustomDomainResource::parent_id(&id).to_string(), APP);
    }

    #[test]
    fn binding_type_defaults_from_the_certificate() {
        let with = CustomDomainResource::expand(&binding(CERTIFICATE)).unwrap();
        assert_eq!(with.binding_type.as_deref(), Some("SniEnabled"));

        let without = CustomDomainResource::expand(&binding("")).unwrap();
        assert_eq!(without.binding_type.as_deref(), Some("Disabled"));
        assert_eq!(without.certificate_id, None);
    }

    #[test]
    fn echoed_certificate_ids_are_classified_and_normalised() {
        let id = CustomDomainResource::resource_id(&binding("")).unwrap();
        let element = CustomDomain {
            name: "a.example.com".into(),
            binding_type: Some("SniEnabled".into()),
            certificate_id: Some(MANAGED.replace("resourceGroups", "resourcegroups")),
        };

        let model = CustomDomainResource::flatten(&id, &element);
        assert_eq!(model.container_app_environment_managed_certificate_id, MANAGED);
        assert_eq!(model.container_app_environment_certificate_id, "");
    }

    #[test]
    fn certificate_lock_matches_the_certificate_identifier() {
        let element = CustomDomainResource::expand(&binding(CERTIFICATE)).unwrap();
        assert_eq!(
            CustomDomainResource::element_lock_keys(&element),
            vec![LockKey::new(CERTIFICATE)]
        );
    }

    #[test]
    fn app_without_ingress_cannot_take_bindings() {
        let mut app = ContainerApp::default();
        let err = CustomDomainResource::collection_mut(&mut app).unwrap_err();
        assert!(err.to_string().contains("ingress"));
        assert!(CustomDomainResource::collection(&app).is_empty());
    }

    #[test]
    fn both_certificate_kinds_at_once_are_rejected() {
        let mut model = binding(CERTIFICATE);
        model.container_app_environment_managed_certificate_id = MANAGED.into();
        assert!(CustomDomainResource::expand(&model).is_err());
    }
}
