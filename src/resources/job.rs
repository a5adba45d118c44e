//! Container App Jobs: run-to-completion workloads started manually, on a schedule or by
//! events.

use super::{differs, expand_tags, location_differs, normalize_environment_id, parse_environment_id};
use crate::api::JobsApi;
use crate::ids::JobId;
use crate::mapper::registry::{expand_registries, flatten_registries};
use crate::mapper::scale::{expand_job_scale_rules, flatten_job_scale_rules};
use crate::mapper::secret::{expand_secrets, flatten_secrets, secret_names};
use crate::mapper::template::{
    carry_containers, expand_containers, expand_volumes, flatten_containers, flatten_volumes,
};
use crate::mapper::{non_empty, non_empty_vec};
use crate::mapper::{ContainerModel, JobScaleRuleModel, RegistryModel, SecretModel, VolumeModel};
use crate::wire::{
    carry_unmodelled, EventTriggerConfig, Job, JobConfiguration, JobProperties, JobScale,
    JobTemplate, ManualTriggerConfig, ScheduleTriggerConfig, Tags,
};
use async_trait::async_trait;
use reconcile_framework::{
    CollectionGuard, ManagedResource, MappingError, Plan, ReconcileError, RemoteError,
    ReplacementGuard, Scope, TransitionError,
};
use serde::{Deserialize, Serialize};

const SECRETS_GUARD: CollectionGuard =
    CollectionGuard::new("secret", "secrets", "Container App Jobs");
const REPLACEMENT_GUARD: ReplacementGuard = ReplacementGuard::new("Container App Jobs");

const MANUAL: &str = "Manual";
const SCHEDULE: &str = "Schedule";
const EVENT: &str = "Event";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobModel {
    pub name: String,
    pub resource_group_name: String,
    pub location: String,
    pub container_app_environment_id: String,
    pub workload_profile_name: String,
    pub replica_timeout_in_seconds: i64,
    pub replica_retry_limit: i64,
    pub secrets: Vec<SecretModel>,
    pub registries: Vec<RegistryModel>,
    pub manual_trigger_config: Option<ManualTriggerModel>,
    pub schedule_trigger_config: Option<ScheduleTriggerModel>,
    pub event_trigger_config: Option<EventTriggerModel>,
    pub template: JobTemplateModel,
    pub tags: Tags,

    // Computed
    pub outbound_ip_addresses: Vec<String>,
    pub event_stream_endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualTriggerModel {
    pub parallelism: i64,
    pub replica_completion_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleTriggerModel {
    pub cron_expression: String,
    pub parallelism: i64,
    pub replica_completion_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTriggerModel {
    pub parallelism: i64,
    pub replica_completion_count: i64,
    pub polling_interval_in_seconds: i64,
    pub min_executions: i64,
    pub max_executions: i64,
    pub scale_rules: Vec<JobScaleRuleModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTemplateModel {
    pub containers: Vec<ContainerModel>,
    pub volumes: Vec<VolumeModel>,
}

pub struct JobResource;

#[async_trait]
impl ManagedResource for JobResource {
    const RESOURCE_TYPE: &'static str = "Container App Job";
    type Id = JobId;
    type Model = JobModel;
    type Wire = Job;
    type Api = dyn JobsApi;

    fn resource_id(scope: &Scope, model: &Self::Model) -> Result<Self::Id, ReconcileError> {
        Ok(JobId::new(
            scope.subscription_id.clone(),
            model.resource_group_name.clone(),
            model.name.clone(),
        ))
    }

    fn expand(model: &Self::Model) -> Result<Self::Wire, MappingError> {
        if model.location.is_empty() {
            return Err(MappingError::new("location is required"));
        }
        parse_environment_id(&model.container_app_environment_id)?;

        Ok(Job {
            location: Some(model.location.clone()),
            tags: expand_tags(&model.tags),
            properties: Some(JobProperties {
                environment_id: Some(model.container_app_environment_id.clone()),
                workload_profile_name: non_empty(&model.workload_profile_name),
                configuration: Some(expand_configuration(model)?),
                template: Some(expand_job_template(&model.template)),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn flatten(id: &Self::Id, wire: Self::Wire, _prior: Option<&Self::Model>) -> Self::Model {
        let properties = wire.properties.unwrap_or_default();
        let configuration = properties.configuration.unwrap_or_default();
        let template = properties.template.unwrap_or_default();

        JobModel {
            name: id.job_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            location: wire.location.unwrap_or_default(),
            container_app_environment_id: normalize_environment_id(properties.environment_id),
            workload_profile_name: properties.workload_profile_name.unwrap_or_default(),
            replica_timeout_in_seconds: configuration.replica_timeout.unwrap_or_default(),
            replica_retry_limit: configuration.replica_retry_limit.unwrap_or_default(),
            secrets: flatten_secrets(configuration.secrets),
            registries: flatten_registries(configuration.registries),
            manual_trigger_config: configuration.manual_trigger_config.map(|manual| {
                ManualTriggerModel {
                    parallelism: manual.parallelism.unwrap_or_default(),
                    replica_completion_count: manual.replica_completion_count.unwrap_or_default(),
                }
            }),
            schedule_trigger_config: configuration.schedule_trigger_config.map(|schedule| {
                ScheduleTriggerModel {
                    cron_expression: schedule.cron_expression.unwrap_or_default(),
                    parallelism: schedule.parallelism.unwrap_or_default(),
                    replica_completion_count: schedule.replica_completion_count.unwrap_or_default(),
                }
            }),
            event_trigger_config: configuration.event_trigger_config.map(flatten_event_trigger),
            template: JobTemplateModel {
                containers: flatten_containers(template.containers),
                volumes: flatten_volumes(template.volumes),
            },
            tags: wire.tags.unwrap_or_default(),
            outbound_ip_addresses: properties.outbound_ip_addresses.unwrap_or_default(),
            event_stream_endpoint: properties.event_stream_endpoint.unwrap_or_default(),
        }
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
        if plan.has_change("tags") {
            wire.tags = expand_tags(&proposed.tags);
        }

        let properties = wire.properties.get_or_insert_with(Default::default);
        if plan.has_change("workload_profile_name") {
            properties.workload_profile_name = non_empty(&proposed.workload_profile_name);
        }
        if plan.has_change("template") {
            let mut template = expand_job_template(&proposed.template);
            if let Some(fetched) = properties.template.take() {
                carry_unmodelled(&mut template.extra, fetched.extra);
                carry_containers(template.containers.as_deref_mut(), fetched.containers);
            }
            properties.template = Some(template);
        }

        let configuration = properties.configuration.get_or_insert_with(Default::default);
        if plan.has_change("secrets") {
            configuration.secrets = expand_secrets(&proposed.secrets);
        }
        if plan.has_change("registries") {
            configuration.registries = expand_registries(&proposed.registries)?;
        }
        if plan.has_change("replica_timeout_in_seconds") {
            configuration.replica_timeout = Some(proposed.replica_timeout_in_seconds);
        }
        if plan.has_change("replica_retry_limit") {
            configuration.replica_retry_limit = Some(proposed.replica_retry_limit);
        }
        if plan.has_change("manual_trigger_config")
            || plan.has_change("schedule_trigger_config")
            || plan.has_change("event_trigger_config")
        {
            let expanded = expand_configuration(proposed)?;
            configuration.trigger_type = expanded.trigger_type;
            configuration.manual_trigger_config = expanded.manual_trigger_config;
            configuration.schedule_trigger_config = expanded.schedule_trigger_config;
            configuration.event_trigger_config = expanded.event_trigger_config;
        }
        Ok(())
    }

    fn strip_read_only(wire: &mut Self::Wire) {
        if let Some(properties) = wire.properties.as_mut() {
            properties.provisioning_state = None;
            properties.outbound_ip_addresses = None;
            properties.event_stream_endpoint = None;
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
            ("location", location_differs(&prior.location, &proposed.location)),
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

fn expand_configuration(model: &JobModel) -> Result<JobConfiguration, MappingError> {
    let triggers = [
        model.manual_trigger_config.is_some(),
        model.schedule_trigger_config.is_some(),
        model.event_trigger_config.is_some(),
    ];
    if triggers.iter().filter(|set| **set).count() != 1 {
        return Err(MappingError::new(
            "exactly one of manual_trigger_config, schedule_trigger_config or event_trigger_config must be specified",
        ));
    }

    let mut configuration = JobConfiguration {
        replica_timeout: Some(model.replica_timeout_in_seconds),
        replica_retry_limit: Some(model.replica_retry_limit),
        secrets: expand_secrets(&model.secrets),
        registries: expand_registries(&model.registries)?,
        ..Default::default()
    };

    if let Some(manual) = &model.manual_trigger_config {
        configuration.trigger_type = Some(MANUAL.to_string());
        configuration.manual_trigger_config = Some(ManualTriggerConfig {
            parallelism: Some(manual.parallelism),
            replica_completion_count: Some(manual.replica_completion_count),
        });
    }
    if let Some(schedule) = &model.schedule_trigger_config {
        if schedule.cron_expression.is_empty() {
            return Err(MappingError::new("schedule_trigger_config requires a cron_expression"));
        }
        configuration.trigger_type = Some(SCHEDULE.to_string());
        configuration.schedule_trigger_config = Some(ScheduleTriggerConfig {
            cron_expression: Some(schedule.cron_expression.clone()),
            parallelism: Some(schedule.parallelism),
            replica_completion_count: Some(schedule.replica_completion_count),
        });
    }
    if let Some(event) = &model.event_trigger_config {
        configuration.trigger_type = Some(EVENT.to_string());
        configuration.event_trigger_config = Some(EventTriggerConfig {
            parallelism: Some(event.parallelism),
            replica_completion_count: Some(event.replica_completion_count),
            scale: Some(JobScale {
                polling_interval: Some(event.polling_interval_in_seconds),
                min_executions: Some(event.min_executions),
                max_executions: Some(event.max_executions),
                rules: expand_job_scale_rules(&event.scale_rules),
            }),
        });
    }
    Ok(configuration)
}

fn flatten_event_trigger(event: EventTriggerConfig) -> EventTriggerModel {
    let scale = event.scale.unwrap_or_default();
    EventTriggerModel {
        parallelism: event.parallelism.unwrap_or_default(),
        replica_completion_count: event.replica_completion_count.unwrap_or_default(),
        polling_interval_in_seconds: scale.polling_interval.unwrap_or_default(),
        min_executions: scale.min_executions.unwrap_or_default(),
        max_executions: scale.max_executions.unwrap_or_default(),
        scale_rules: flatten_job_scale_rules(scale.rules),
    }
}

fn expand_job_template(template: &JobTemplateModel) -> JobTemplate {
    JobTemplate {
        containers: expand_containers(&template.containers),
        volumes: expand_volumes(&template.volumes),
        ..Default::default()
    }
}
