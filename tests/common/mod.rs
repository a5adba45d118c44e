#![allow(dead_code)]

use containerapps::ids::{ContainerAppId, ManagedEnvironmentId};
use containerapps::lifecycle::Provider;
use containerapps::mapper::{
    ContainerModel, EnvVarModel, IngressModel, SecretModel, TemplateModel, TrafficWeightModel,
};
use containerapps::resources::{CertificateModel, ContainerAppModel, ManagedEnvironmentModel};
use reconcile_framework::{EngineConfig, Scope};

pub const SUBSCRIPTION: &str = "sub";

pub fn scope() -> Scope {
    Scope::new(SUBSCRIPTION)
}

pub fn config() -> EngineConfig {
    containerapps::lifecycle::try_setup_tracing();
    EngineConfig::immediate()
}

pub fn environment() -> ManagedEnvironmentModel {
    ManagedEnvironmentModel {
        name: "env1".into(),
        resource_group_name: "rg1".into(),
        location: "westeurope".into(),
        log_analytics_workspace_customer_id: "workspace-id".into(),
        log_analytics_workspace_shared_key: "workspace-key".into(),
        ..Default::default()
    }
}

pub fn environment_id() -> ManagedEnvironmentId {
    ManagedEnvironmentId::new(SUBSCRIPTION, "rg1", "env1")
}

pub fn app() -> ContainerAppModel {
    ContainerAppModel {
        name: "foo".into(),
        resource_group_name: "rg1".into(),
        container_app_environment_id: environment_id().to_string(),
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

pub fn app_id() -> ContainerAppId {
    ContainerAppId::new(SUBSCRIPTION, "rg1", "foo")
}

pub fn certificate(name: &str) -> CertificateModel {
    CertificateModel {
        name: name.into(),
        container_app_environment_id: environment_id().to_string(),
        certificate_blob_base64: "MIIKcQIBAzCCCjcGCSqGSIb3DQEHAaCCCigEggokMIIKIDCCBNcGCSqGSIb3"
            .into(),
        certificate_password: "hunter2".into(),
        ..Default::default()
    }
}

/// An environment holding the `foo` app.
pub async fn environment_with_app(provider: &Provider) {
    provider
        .environments
        .create(&environment())
        .await
        .expect("Failed to create environment");
    provider
        .container_apps
        .create(&app())
        .await
        .expect("Failed to create app");
}

/// Reads the `foo` app and fails the test if it is gone.
pub async fn read_app(provider: &Provider, prior: &ContainerAppModel) -> ContainerAppModel {
    provider
        .container_apps
        .read(&app_id().to_string(), Some(prior))
        .await
        .expect("Failed to read app")
        .into_model()
        .expect("App not found")
}
