//! # Container Apps
//!
//! The app is the busiest kind: it carries secrets the API never returns on GET,
//! a write-once revision suffix, and the custom domain list that is owned by
//! [`CustomDomainResource`](super::CustomDomainResource) rather than by the app itself.
//!
//! ## Update rules
//!
//! - Secrets are listed through `listSecrets` before every full write.
//! - Ingress, Dapr and the template are rebuilt from desired state when they changed, but
//!   keep what the fetched blocks hold beyond the model (custom domains, health checks, init
//!   containers).
//! - The revision suffix is only sent when it changed; re-sending a used suffix is a
//!   conflict.
//! - Removing a secret, or moving the app to another environment, is refused before any
//!   remote call.

use super::{
    differs, environment_location, expand_tags, normalize_environment_id, parse_environment_id,
};
use crate::api::ContainerAppsApi;
use crate::ids::ContainerAppId;
use crate::mapper::dapr::{expand_dapr, flatten_dapr};
use crate::mapper::ingress::{expand_ingress, flatten_ingress};
use crate::mapper::registry::{expand_registries, flatten_registries};
use crate::mapper::secret::{expand_secrets, flatten_secrets, secret_names};
use crate::mapper::template::{
    carry_template, expand_template, flatten_template, referenced_secrets,
};
use crate::mapper::{non_empty, non_empty_vec};
use crate::mapper::{DaprModel, IngressModel, RegistryModel, SecretModel, TemplateModel};
use crate::wire::{carry_unmodelled, ContainerApp, ContainerAppProperties, Configuration, Tags};
use async_trait::async_trait;
use reconcile_framework::{
    CollectionGuard, ManagedResource, MappingError, Phase, Plan, ReconcileError, RemoteError,
    ReplacementGuard, Scope, TransitionError,
};
use serde::{Deserialize, Serialize};

pub(crate) const SECRETS_GUARD: CollectionGuard =
    CollectionGuard::new("secret", "secrets", "Container Apps");

const REPLACEMENT_GUARD: ReplacementGuard = ReplacementGuard::new("Container Apps");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerAppModel {
    pub name: String,
    pub resource_group_name: String,
    pub container_app_environment_id: String,
    /// `Single` or `Multiple`.
    pub revision_mode: String,
    pub workload_profile_name: String,
    pub secrets: Vec<SecretModel>,
    pub registries: Vec<RegistryModel>,
    pub ingress: Option<IngressModel>,
    pub dapr: Option<DaprModel>,
    pub template: TemplateModel,
    pub tags: Tags,

    // Computed
    pub location: String,
    pub latest_revision_name: String,
    pub latest_revision_fqdn: String,
    pub outbound_ip_addresses: Vec<String>,
    pub custom_domain_verification_id: String,
}

pub struct ContainerAppResource;

#[async_trait]
impl ManagedResource for ContainerAppResource {
    const RESOURCE_TYPE: &'static str = "Container App";
    type Id = ContainerAppId;
    type Model = ContainerAppModel;
    type Wire = ContainerApp;
    type Api = dyn ContainerAppsApi;

    fn resource_id(scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        Ok(ContainerAppId::new(
            scope.subscription_id.clone(),
            model.resource_group_name.clone(),
            model.name.clone(),
        ))
    }

    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError> {
        validate(model)?;

        Ok(ContainerApp {
            location: None,
            tags: expand_tags(&model.tags),
            properties: Some(ContainerAppProperties {
                managed_environment_id: Some(model.container_app_environment_id.clone()),
                workload_profile_name: non_empty(&model.workload_profile_name),
                configuration: Some(Configuration {
                    active_revisions_mode: non_empty(&model.revision_mode),
                    secrets: expand_secrets(&model.secrets),
                    ingress: expand_ingress(model.ingress.as_ref(), &model.name),
                    registries: expand_registries(&model.registries)?,
                    dapr: expand_dapr(model.dapr.as_ref()),
                    ..Default::default()
                }),
                template: Some(expand_template(&model.template)),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(id: &Self::Id, wire: Self::Wire, _prior: Option<&Self::Model>) -> Self::Model {
        let properties = wire.properties.unwrap_or_default();
        let configuration = properties.configuration.unwrap_or_default();
        let name = id.container_app_name.clone();

        ContainerAppModel {
            ingress: flatten_ingress(configuration.ingress, &name),
            name,
            resource_group_name: id.resource_group_name.clone(),
            container_app_environment_id: normalize_environment_id(
                properties.managed_environment_id,
            ),
            revision_mode: configuration.active_revisions_mode.unwrap_or_default(),
            workload_profile_name: properties.workload_profile_name.unwrap_or_default(),
            secrets: flatten_secrets(configuration.secrets),
            registries: flatten_registries(configuration.registries),
            dapr: flatten_dapr(configuration.dapr),
            template: flatten_template(properties.template),
            tags: wire.tags.unwrap_or_default(),
            location: wire.location.unwrap_or_default(),
            latest_revision_name: properties.latest_revision_name.unwrap_or_default(),
            latest_revision_fqdn: properties.latest_revision_fqdn.unwrap_or_default(),
            outbound_ip_addresses: properties.outbound_ip_addresses.unwrap_or_default(),
            custom_domain_verification_id: properties
                .custom_domain_verification_id
                .unwrap_or_default(),
        }
    }

    async fn prepare_create(
        api: &Self::Api,
        id: &Self::Id,
        model: &Self::Model,
        wire: &mut Self::Wire,
    ) -> Result<(), ReconcileError> {
        let environment_id = parse_environment_id(&model.container_app_environment_id)
            .map_err(|e| ReconcileError::invalid(Self::RESOURCE_TYPE, id, Phase::Create, e))?;
        wire.location = environment_location(api, &environment_id).await?;
        Ok(())
    }

    async fn resource_secrets(
        api: &Self::Api,
        id: &Self::Id,
        wire: &mut Self::Wire,
        _prior: Option<&Self::Model>,
    ) -> Result<(), RemoteError> {
        let secrets = api.list_secrets(id).await?;
        wire.configuration_mut().secrets = non_empty_vec(secrets);
        Ok(())
    }

    fn apply_changes(wire: &mut Self::Wire, plan: &Plan<Self::Model>) -> Result<(), MappingError> {
        let proposed = &plan.proposed;
        validate(proposed)?;

        if plan.has_change("tags") {
            wire.tags = expand_tags(&proposed.tags);
        }

        let properties = wire.properties.get_or_insert_with(Default::default);
        if plan.has_change("workload_profile_name") {
            properties.workload_profile_name = non_empty(&proposed.workload_profile_name);
        }

        let configuration = properties.configuration.get_or_insert_with(Default::default);
        if plan.has_change("revision_mode") {
            configuration.active_revisions_mode = non_empty(&proposed.revision_mode);
        }
        if plan.has_change("secrets") {
            configuration.secrets = expand_secrets(&proposed.secrets);
        }
        if plan.has_change("registries") {
            configuration.registries = expand_registries(&proposed.registries)?;
        }
        if plan.has_change("ingress") {
            let fetched = configuration.ingress.take();
            configuration.ingress =
                expand_ingress(proposed.ingress.as_ref(), &proposed.name).map(|mut ingress| {
                    if let Some(fetched) = fetched {
                        ingress.custom_domains = fetched.custom_domains;
                        carry_unmodelled(&mut ingress.extra, fetched.extra);
                    }
                    ingress
                });
        }
        if plan.has_change("dapr") {
            let fetched = configuration.dapr.take();
            configuration.dapr = expand_dapr(proposed.dapr.as_ref()).map(|mut dapr| {
                if let Some(fetched) = fetched {
                    carry_unmodelled(&mut dapr.extra, fetched.extra);
                }
                dapr
            });
        }

        if plan.has_change("template") {
            let mut template = expand_template(&proposed.template);
            if !plan.has_change("template.revision_suffix") {
                template.revision_suffix = None;
            }
            if let Some(fetched) = properties.template.take() {
                carry_template(&mut template, fetched);
            }
            properties.template = Some(template);
        } else if let Some(template) = properties.template.as_mut() {
            template.revision_suffix = None;
        }
        Ok(())
    }

    fn strip_read_only(wire: &mut Self::Wire) {
        let Some(properties) = wire.properties.as_mut() else {
            return;
        };
        properties.provisioning_state = None;
        properties.latest_revision_name = None;
        properties.latest_revision_fqdn = None;
        properties.outbound_ip_addresses = None;
        properties.event_stream_endpoint = None;
        properties.custom_domain_verification_id = None;
        if let Some(ingress) = properties.configuration.as_mut().and_then(|c| c.ingress.as_mut()) {
            ingress.fqdn = None;
        }
    }

    fn prepare_rewrite(wire: &mut Self::Wire) {
        if let Some(template) = wire.template_mut() {
            template.revision_suffix = None;
        }
    }

    fn check_transition(plan: &Plan<Self::Model>) -> Result<(), TransitionError> {
        let (prior, proposed) = (&plan.prior, &plan.proposed);
        SECRETS_GUARD.check(secret_names(&prior.secrets), secret_names(&proposed.secrets))?;
        REPLACEMENT_GUARD.check([
            ("name", differs(&prior.name, &proposed.name)),
            (
                "resource_group_name",
                differs(&prior.resource_group_name, &proposed.resource_group_name),
            ),
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

fn validate(model: &ContainerAppModel) -> Result<(), MappingError> {
    parse_environment_id(&model.container_app_environment_id)?;
    if model.template.containers.is_empty() {
        return Err(MappingError::new("template must contain at least one container"));
    }

    let defined: Vec<&str> = secret_names(&model.secrets).collect();
    let registry_refs = model
        .registries
        .iter()
        .map(|registry| registry.password_secret_name.as_str())
        .filter(|name| !name.is_empty());
    for name in referenced_secrets(&model.template.containers).chain(registry_refs) {
        if !defined.contains(&name) {
            return Err(MappingError::new(format!(
                "secret {name:?} is referenced but not defined in secrets"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mapper::{ContainerModel, EnvVarModel, TrafficWeightModel};
    use crate::wire::{CustomDomain, Ingress, Secret, Template};

    pub(crate) const ENVIRONMENT: &str =
        "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.App/managedEnvironments/env1";

    pub(crate) fn app() -> ContainerAppModel {
        ContainerAppModel {
            name: "foo".into(),
            resource_group_name: "rg1".into(),
            container_app_environment_id: ENVIRONMENT.into(),
            revision_mode: "Single".into(),
            secrets: vec![SecretModel::new("rick", "morty")],
            ingress: Some(IngressModel {
                external_enabled: true,
                target_port: 80,
                transport: "auto".into(),
                traffic_weights: vec![TrafficWeightModel {
                    latest_revision: true,
                    percentage: 100,
                    ..Default::default()
                }],
                ..Default::default()
            }),
            template: TemplateModel {
                containers: vec![ContainerModel {
                    name: "web".into(),
                    image: "mcr.microsoft.com/k8se/quickstart:latest".into(),
                    cpu: 0.25,
                    memory: "0.5Gi".into(),
                    env: vec![EnvVarModel {
                        name: "PASSWORD".into(),
                        secret_name: "rick".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                revision_suffix: "v1".into(),
                max_replicas: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn id() -> ContainerAppId {
        ContainerAppId::new("sub", "rg1", "foo")
    }

    #[test]
    fn round_trips_through_the_wire_model() {
        let wire = ContainerAppResource::expand(&app()).unwrap();
        assert_eq!(ContainerAppResource::flatten(&id(), wire, None), app());
    }

    #[test]
    fn environment_must_be_a_valid_identifier() {
        let mut model = app();
        model.container_app_environment_id = "env1".into();
        let err = ContainerAppResource::expand(&model).unwrap_err();
        assert!(err.to_string().starts_with("parsing container_app_environment_id"));
    }

    #[test]
    fn undefined_secret_references_are_rejected() {
        let mut model = app();
        model.secrets.clear();
        let err = ContainerAppResource::expand(&model).unwrap_err();
        assert!(err.to_string().contains("\"rick\""));
    }

    #[test]
    fn unchanged_revision_suffix_is_not_resent() {
        let prior = app();
        let mut proposed = app();
        proposed.template.max_replicas = 5;
        let plan = Plan::new(prior, proposed).unwrap();

        let mut wire = ContainerAppResource::expand(&app()).unwrap();
        ContainerAppResource::apply_changes(&mut wire, &plan).unwrap();

        let template = wire.properties.unwrap().template.unwrap();
        assert_eq!(template.revision_suffix, None);
        assert_eq!(template.scale.unwrap().max_replicas, Some(5));
    }

    #[test]
    fn changed_revision_suffix_is_sent() {
        let prior = app();
        let mut proposed = app();
        proposed.template.revision_suffix = "v2".into();
        let plan = Plan::new(prior, proposed).unwrap();

        let mut wire = ContainerAppResource::expand(&app()).unwrap();
        ContainerAppResource::apply_changes(&mut wire, &plan).unwrap();
        assert_eq!(
            wire.properties.unwrap().template.unwrap().revision_suffix.as_deref(),
            Some("v2")
        );
    }

    #[test]
    fn ingress_changes_keep_bound_custom_domains() {
        let prior = app();
        let mut proposed = app();
        proposed.ingress.as_mut().unwrap().target_port = 8080;
        let plan = Plan::new(prior, proposed).unwrap();

        let mut wire = ContainerAppResource::expand(&app()).unwrap();
        wire.configuration_mut().ingress.as_mut().unwrap().custom_domains = Some(vec![CustomDomain {
            name: "a.example.com".into(),
            ..Default::default()
        }]);
        ContainerAppResource::apply_changes(&mut wire, &plan).unwrap();

        let ingress: &Ingress = wire.ingress().unwrap();
        assert_eq!(ingress.target_port, Some(8080));
        assert_eq!(ingress.custom_domains.as_ref().unwrap()[0].name, "a.example.com");
    }

    #[test]
    fn removing_a_secret_is_refused() {
        let prior = app();
        let mut proposed = app();
        proposed.secrets.clear();
        proposed.template.containers[0].env.clear();
        let plan = Plan::new(prior, proposed).unwrap();

        let err = ContainerAppResource::check_transition(&plan).unwrap_err();
        assert_eq!(err.names, vec!["rick".to_string()]);
    }

    #[test]
    fn moving_to_another_environment_is_refused() {
        let mut proposed = app();
        proposed.container_app_environment_id = ENVIRONMENT.replace("env1", "env2");
        let plan = Plan::new(app(), proposed).unwrap();

        let err = ContainerAppResource::check_transition(&plan).unwrap_err();
        assert_eq!(err.names, vec!["container_app_environment_id"]);
        assert!(err.message.contains("Container Apps"));

        let mut recased = app();
        recased.container_app_environment_id = ENVIRONMENT.to_uppercase();
        let plan = Plan::new(app(), recased).unwrap();
        assert!(ContainerAppResource::check_transition(&plan).is_ok());
    }

    #[test]
    fn template_rebuild_keeps_fetched_health_checks() {
        let prior = app();
        let mut proposed = app();
        proposed.template.containers[0].image = "nginx".into();
        let plan = Plan::new(prior, proposed).unwrap();

        let mut wire = ContainerAppResource::expand(&app()).unwrap();
        let template = wire.template_mut().unwrap();
        template.containers.as_mut().unwrap()[0]
            .extra
            .insert("probes".into(), serde_json::json!([{"type": "Readiness"}]));
        template.extra.insert("serviceBinds".into(), serde_json::json!([]));
        ContainerAppResource::apply_changes(&mut wire, &plan).unwrap();

        let template = wire.properties.unwrap().template.unwrap();
        let container = &template.containers.unwrap()[0];
        assert_eq!(container.image.as_deref(), Some("nginx"));
        assert_eq!(container.extra["probes"][0]["type"], "Readiness");
        assert_eq!(template.extra["serviceBinds"], serde_json::json!([]));
    }

    #[test]
    fn read_only_fields_are_stripped() {
        let mut wire = ContainerAppResource::expand(&app()).unwrap();
        {
            let properties = wire.properties.as_mut().unwrap();
            properties.provisioning_state = Some("Succeeded".into());
            properties.latest_revision_fqdn = Some("foo--v1.env1.io".into());
            properties.outbound_ip_addresses = Some(vec!["20.0.0.1".into()]);
        }
        wire.configuration_mut().ingress.as_mut().unwrap().fqdn = Some("foo.env1.io".into());

        ContainerAppResource::strip_read_only(&mut wire);
        let properties = wire.properties.as_ref().unwrap();
        assert_eq!(properties.provisioning_state, None);
        assert_eq!(properties.latest_revision_fqdn, None);
        assert_eq!(properties.outbound_ip_addresses, None);
        assert_eq!(wire.ingress().unwrap().fqdn, None);
    }

    #[test]
    fn rewrites_drop_the_revision_suffix() {
        let mut wire = ContainerApp {
            properties: Some(ContainerAppProperties {
                template: Some(Template {
                    revision_suffix: Some("v1".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        ContainerAppResource::prepare_rewrite(&mut wire);
        assert_eq!(wire.properties.unwrap().template.unwrap().revision_suffix, None);
    }

    #[test]
    fn listed_secrets_replace_redacted_ones() {
        let mut wire = ContainerAppResource::expand(&app()).unwrap();
        wire.configuration_mut().secrets = Some(vec![Secret {
            name: Some("rick".into()),
            ..Default::default()
        }]);
        let flattened = ContainerAppResource::flatten(&id(), wire, None);
        assert_eq!(flattened.secrets, vec![SecretModel::new("rick", "")]);
    }
}
