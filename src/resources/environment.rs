//! Managed Environments: the network and logging boundary apps and jobs run in.
//!
//! The Log Analytics shared key is accepted on write and never returned, so it is carried
//! over from the prior local model. Updates omit the logs configuration entirely unless
//! the workspace changed; the service keeps the stored configuration in that case. Clearing
//! the workspace therefore sends an empty logs block, which switches log forwarding off.
//!
//! Location and networking are fixed when the environment is created.

use super::{differs, expand_tags, location_differs};
use crate::api::EnvironmentsApi;
use crate::ids::ManagedEnvironmentId;
use crate::mapper::non_empty;
use crate::wire::{
    AppLogsConfiguration, LogAnalyticsConfiguration, ManagedEnvironment,
    ManagedEnvironmentProperties, Tags, VnetConfiguration,
};
use async_trait::async_trait;
use reconcile_framework::{
    ManagedResource, MappingError, Plan, ReconcileError, ReplacementGuard, Scope, TransitionError,
};
use serde::{Deserialize, Serialize};

const LOG_ANALYTICS: &str = "log-analytics";

const REPLACEMENT_GUARD: ReplacementGuard = ReplacementGuard::new("Managed Environments");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedEnvironmentModel {
    pub name: String,
    pub resource_group_name: String,
    pub location: String,
    pub log_analytics_workspace_customer_id: String,
    /// Write-only.
    pub log_analytics_workspace_shared_key: String,
    pub infrastructure_subnet_id: String,
    pub internal_load_balancer_enabled: bool,
    pub zone_redundancy_enabled: bool,
    pub tags: Tags,

    pub default_domain: String,
    pub static_ip_address: String,
}

pub struct ManagedEnvironmentResource;

#[async_trait]
impl ManagedResource for ManagedEnvironmentResource {
    const RESOURCE_TYPE: &'static str = "Managed Environment";
    type Id = ManagedEnvironmentId;
    type Model = ManagedEnvironmentModel;
    type Wire = ManagedEnvironment;
    type Api = dyn EnvironmentsApi;

    fn resource_id(scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        Ok(ManagedEnvironmentId::new(
            scope.subscription_id.clone(),
            model.resource_group_name.clone(),
            model.name.clone(),
        ))
    }

    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError> {
        if model.location.is_empty() {
            return Err(MappingError::new("location is required"));
        }
        if model.internal_load_balancer_enabled && model.infrastructure_subnet_id.is_empty() {
            return Err(MappingError::new(
                "internal_load_balancer_enabled requires infrastructure_subnet_id",
            ));
        }

        Ok(ManagedEnvironment {
            location: Some(model.location.clone()),
            tags: expand_tags(&model.tags),
            properties: Some(ManagedEnvironmentProperties {
                app_logs_configuration: expand_logs(model)?,
                vnet_configuration: expand_vnet(model),
                zone_redundant: Some(model.zone_redundancy_enabled),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(id: &Self::Id, wire: Self::Wire, prior: Option<&Self::Model>) -> Self::Model {
        let properties = wire.properties.unwrap_or_default();
        let workspace = properties
            .app_logs_configuration
            .and_then(|logs| logs.log_analytics_configuration)
            .unwrap_or_default();
        let vnet = properties.vnet_configuration.unwrap_or_default();

        ManagedEnvironmentModel {
            name: id.environment_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            location: wire.location.unwrap_or_default(),
            log_analytics_workspace_customer_id: workspace.customer_id.unwrap_or_default(),
            log_analytics_workspace_shared_key: prior
                .map(|prior| prior.log_analytics_workspace_shared_key.clone())
                .unwrap_or_default(),
            infrastructure_subnet_id: vnet.infrastructure_subnet_id.unwrap_or_default(),
            internal_load_balancer_enabled: vnet.internal.unwrap_or_default(),
            zone_redundancy_enabled: properties.zone_redundant.unwrap_or_default(),
            tags: wire.tags.unwrap_or_default(),
            default_domain: properties.default_domain.unwrap_or_default(),
            static_ip_address: properties.static_ip.unwrap_or_default(),
        }
    }

    fn apply_changes(wire: &mut Self::Wire, plan: &Plan<Self::Model>) -> Result<(), MappingError> {
        let proposed = &plan.proposed;
        if plan.has_change("tags") {
            wire.tags = expand_tags(&proposed.tags);
        }

        let properties = wire.properties.get_or_insert_with(Default::default);
        // The fetched block has no shared key; sending it back would be rejected.
        let workspace_changed = plan.has_change("log_analytics_workspace_customer_id")
            || plan.has_change("log_analytics_workspace_shared_key");
        properties.app_logs_configuration = if workspace_changed {
            Some(expand_logs(proposed)?.unwrap_or_default())
        } else {
            None
        };
        if plan.has_change("zone_redundancy_enabled") {
            properties.zone_redundant = Some(proposed.zone_redundancy_enabled);
        }
        Ok(())
    }

    fn strip_read_only(wire: &mut Self::Wire) {
        if let Some(properties) = wire.properties.as_mut() {
            properties.provisioning_state = None;
            properties.default_domain = None;
            properties.static_ip = None;
        }
    }

    fn check_transition(plan: &Plan<Self::Model>) -> Result<(), TransitionError> {
        let (prior, proposed) = (&plan.prior, &plan.proposed);
        REPLACEMENT_GUARD.check([
            ("name", differs(&prior.name, &proposed.name)),
            (
                "resource_group_name",
                differs(&prior.resource_group_name, &proposed.resource_group_name),
            ),
            ("location", location_differs(&prior.location, &proposed.location)),
            (
                "infrastructure_subnet_id",
                differs(&prior.infrastructure_subnet_id, &proposed.infrastructure_subnet_id),
            ),
            (
                "internal_load_balancer_enabled",
                prior.internal_load_balancer_enabled != proposed.internal_load_balancer_enabled,
            ),
        ])
    }
}

fn expand_vnet(model: &ManagedEnvironmentModel) -> Option<VnetConfiguration> {
    if model.infrastructure_subnet_id.is_empty() {
        return None;
    }
    Some(VnetConfiguration {
        infrastructure_subnet_id: Some(model.infrastructure_subnet_id.clone()),
        internal: Some(model.internal_load_balancer_enabled),
        ..Default::default()
    })
}

fn expand_logs(
    model: &ManagedEnvironmentModel,
) -> Result<Option<AppLogsConfiguration>, MappingError> {
    if model.log_analytics_workspace_customer_id.is_empty() {
        return Ok(None);
    }
    if model.log_analytics_workspace_shared_key.is_empty() {
        return Err(MappingError::new(
            "log_analytics_workspace_shared_key is required with log_analytics_workspace_customer_id",
        ));
    }

    Ok(Some(AppLogsConfiguration {
        destination: Some(LOG_ANALYTICS.to_string()),
        log_analytics_configuration: Some(LogAnalyticsConfiguration {
            customer_id: non_empty(&model.log_analytics_workspace_customer_id),
            shared_key: non_empty(&model.log_analytics_workspace_shared_key),
        }),
    }))
}
