//! Revision templates: containers, volumes and scale settings.
//!
//! Containers and volumes are shared by apps and jobs; scale settings and the revision
//! suffix only exist on apps.

use super::scale::{expand_scale_rules, flatten_scale_rules};
use super::scale::{AzureQueueScaleRuleModel, CustomScaleRuleModel, RequestScaleRuleModel};
use super::{non_empty, non_empty_vec, non_zero};
use crate::wire::{
    carry_unmodelled, Container, ContainerResources, EnvironmentVar, Scale, Template, Volume,
    VolumeMount,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateModel {
    pub containers: Vec<ContainerModel>,
    /// Write-once per revision.
    pub revision_suffix: String,
    pub min_replicas: i64,
    pub max_replicas: i64,
    pub termination_grace_period_seconds: i64,
    pub volumes: Vec<VolumeModel>,
    pub azure_queue_scale_rules: Vec<AzureQueueScaleRuleModel>,
    pub custom_scale_rules: Vec<CustomScaleRuleModel>,
    pub http_scale_rules: Vec<RequestScaleRuleModel>,
    pub tcp_scale_rules: Vec<RequestScaleRuleModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerModel {
    pub name: String,
    pub image: String,
    pub cpu: f64,
    /// e.g. `0.5Gi`
    pub memory: String,
    /// Computed from cpu and memory.
    pub ephemeral_storage: String,
    pub args: Vec<String>,
    pub command: Vec<String>,
    pub env: Vec<EnvVarModel>,
    pub volume_mounts: Vec<VolumeMountModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvVarModel {
    pub name: String,
    pub value: String,
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeMountModel {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeModel {
    pub name: String,
    pub storage_name: String,
    /// `AzureFile` or `EmptyDir`.
    pub storage_type: String,
}

/// The revision suffix is included when set. Callers drop it when it did not change.
pub fn expand_template(input: &TemplateModel) -> Template {
    Template {
        revision_suffix: non_empty(&input.revision_suffix),
        termination_grace_period_seconds: non_zero(input.termination_grace_period_seconds),
        containers: expand_containers(&input.containers),
        scale: Some(Scale {
            min_replicas: Some(input.min_replicas),
            max_replicas: non_zero(input.max_replicas),
            rules: expand_scale_rules(input),
            ..Default::default()
        }),
        volumes: expand_volumes(&input.volumes),
        ..Default::default()
    }
}

/// Move what a fetched template holds beyond the model into a rebuilt one.
pub fn carry_template(rebuilt: &mut Template, fetched: Template) {
    carry_unmodelled(&mut rebuilt.extra, fetched.extra);
    if let (Some(scale), Some(fetched)) = (rebuilt.scale.as_mut(), fetched.scale) {
        carry_unmodelled(&mut scale.extra, fetched.extra);
    }
    carry_containers(rebuilt.containers.as_deref_mut(), fetched.containers);
}

/// Containers are matched by name. A renamed container starts out clean.
pub fn carry_containers(rebuilt: Option<&mut [Container]>, fetched: Option<Vec<Container>>) {
    let Some(rebuilt) = rebuilt else {
        return;
    };
    for fetched in fetched.into_iter().flatten() {
        let matching = rebuilt.iter_mut().find(|container| container.name == fetched.name);
        if let Some(container) = matching {
            carry_unmodelled(&mut container.extra, fetched.extra);
        }
    }
}

pub fn flatten_template(input: Option<Template>) -> TemplateModel {
    let Some(template) = input else {
        return TemplateModel::default();
    };

    let mut model = TemplateModel {
        containers: flatten_containers(template.containers),
        revision_suffix: template.revision_suffix.unwrap_or_default(),
        termination_grace_period_seconds: template
            .termination_grace_period_seconds
            .unwrap_or_default(),
        volumes: flatten_volumes(template.volumes),
        ..Default::default()
    };
    if let Some(scale) = template.scale {
        model.min_replicas = scale.min_replicas.unwrap_or_default();
        model.max_replicas = scale.max_replicas.unwrap_or_default();
        flatten_scale_rules(scale.rules, &mut model);
    }
    model
}

pub fn expand_containers(input: &[ContainerModel]) -> Option<Vec<Container>> {
    non_empty_vec(
        input
            .iter()
            .map(|container| Container {
                name: Some(container.name.clone()),
                image: Some(container.image.clone()),
                command: non_empty_vec(container.command.clone()),
                args: non_empty_vec(container.args.clone()),
                env: non_empty_vec(
                    container
                        .env
                        .iter()
                        .map(|env| EnvironmentVar {
                            name: Some(env.name.clone()),
                            value: non_empty(&env.value),
                            secret_ref: non_empty(&env.secret_name),
                        })
                        .collect(),
                ),
                resources: Some(ContainerResources {
                    cpu: Some(container.cpu),
                    memory: Some(container.memory.clone()),
                    ephemeral_storage: None,
                }),
                volume_mounts: non_empty_vec(
                    container
                        .volume_mounts
                        .iter()
                        .map(|mount| VolumeMount {
                            volume_name: Some(mount.name.clone()),
                            mount_path: Some(mount.path.clone()),
                        })
                        .collect(),
                ),
                ..Default::default()
            })
            .collect(),
    )
}

pub fn flatten_containers(input: Option<Vec<Container>>) -> Vec<ContainerModel> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|container| {
            let resources = container.resources.unwrap_or_default();
            ContainerModel {
                name: container.name.unwrap_or_default(),
                image: container.image.unwrap_or_default(),
                cpu: resources.cpu.unwrap_or_default(),
                memory: resources.memory.unwrap_or_default(),
                ephemeral_storage: resources.ephemeral_storage.unwrap_or_default(),
                args: container.args.unwrap_or_default(),
                command: container.command.unwrap_or_default(),
                env: container
                    .env
                    .unwrap_or_default()
                    .into_iter()
                    .map(|env| EnvVarModel {
                        name: env.name.unwrap_or_default(),
                        value: env.value.unwrap_or_default(),
                        secret_name: env.secret_ref.unwrap_or_default(),
                    })
                    .collect(),
                volume_mounts: container
                    .volume_mounts
                    .unwrap_or_default()
                    .into_iter()
                    .map(|mount| VolumeMountModel {
                        name: mount.volume_name.unwrap_or_default(),
                        path: mount.mount_path.unwrap_or_default(),
                    })
                    .collect(),
            }
        })
        .collect()
}

pub fn expand_volumes(input: &[VolumeModel]) -> Option<Vec<Volume>> {
    non_empty_vec(
        input
            .iter()
            .map(|volume| Volume {
                name: Some(volume.name.clone()),
                storage_name: non_empty(&volume.storage_name),
                storage_type: non_empty(&volume.storage_type),
            })
            .collect(),
    )
}

pub fn flatten_volumes(input: Option<Vec<Volume>>) -> Vec<VolumeModel> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|volume| VolumeModel {
            name: volume.name.unwrap_or_default(),
            storage_name: volume.storage_name.unwrap_or_default(),
            storage_type: volume.storage_type.unwrap_or_default(),
        })
        .collect()
}

/// Secret names referenced from container environments.
pub fn referenced_secrets(containers: &[ContainerModel]) -> impl Iterator<Item = &str> {
    containers
        .iter()
        .flat_map(|container| container.env.iter())
        .filter(|env| !env.secret_name.is_empty())
        .map(|env| env.secret_name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> ContainerModel {
        ContainerModel {
            name: "web".into(),
            image: "mcr.microsoft.com/k8se/quickstart:latest".into(),
            cpu: 0.25,
            memory: "0.5Gi".into(),
            args: vec!["--port".into(), "8080".into()],
            env: vec![
                EnvVarModel {
                    name: "MODE".into(),
                    value: "demo".into(),
                    ..Default::default()
                },
                EnvVarModel {
                    name: "PASSWORD".into(),
                    secret_name: "rick".into(),
                    ..Default::default()
                },
            ],
            volume_mounts: vec![VolumeMountModel {
                name: "scratch".into(),
                path: "/tmp/scratch".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn round_trips() {
        let template = TemplateModel {
            containers: vec![container()],
            revision_suffix: "v1".into(),
            min_replicas: 1,
            max_replicas: 5,
            volumes: vec![VolumeModel {
                name: "scratch".into(),
                storage_type: "EmptyDir".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(flatten_template(Some(expand_template(&template))), template);
    }

    #[test]
    fn computed_storage_is_never_sent() {
        let mut with_storage = container();
        with_storage.ephemeral_storage = "1Gi".into();
        let expanded = expand_containers(&[with_storage]).unwrap();
        assert_eq!(expanded[0].resources.as_ref().unwrap().ephemeral_storage, None);
    }

    #[test]
    fn missing_template_flattens_to_default() {
        assert_eq!(flatten_template(None), TemplateModel::default());
    }

    #[test]
    fn rebuilt_template_keeps_fetched_health_checks_and_init_containers() {
        let fetched: Template = serde_json::from_value(serde_json::json!({
            "initContainers": [{"name": "migrate", "image": "tools"}],
            "scale": {"minReplicas": 0, "cooldownPeriod": 300},
            "containers": [
                {"name": "web", "image": "old", "probes": [{"type": "Liveness"}]},
                {"name": "gone", "image": "old", "probes": [{"type": "Startup"}]}
            ]
        }))
        .unwrap();

        let mut updated = container();
        updated.image = "new".into();
        let mut rebuilt = expand_template(&TemplateModel {
            containers: vec![updated],
            ..Default::default()
        });
        carry_template(&mut rebuilt, fetched);

        assert_eq!(rebuilt.extra["initContainers"][0]["name"], "migrate");
        assert_eq!(rebuilt.scale.as_ref().unwrap().extra["cooldownPeriod"], 300);
        let containers = rebuilt.containers.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].image.as_deref(), Some("new"));
        assert_eq!(containers[0].extra["probes"][0]["type"], "Liveness");
    }

    #[test]
    fn secret_references_are_listed() {
        let binding = [container()];
        let names: Vec<&str> = referenced_secrets(&binding).collect();
        assert_eq!(names, vec!["rick"]);
    }
}
