mod common;

use common::{
    app, app_id, certificate, config, environment, environment_id, environment_with_app, read_app,
    scope,
};
use containerapps::ids::{
    CertificateId, DaprComponentId, EnvironmentStorageId, JobId, ManagedEnvironmentId,
};
use containerapps::lifecycle::Provider;
use containerapps::mapper::{ContainerModel, SecretModel};
use containerapps::resources::{
    DaprComponentModel, DaprMetadataModel, EnvironmentStorageModel, JobModel, JobTemplateModel,
    ScheduleTriggerModel,
};
use containerapps::wire::{
    Certificate, ContainerApp, DaprComponent, Job, ManagedEnvironment, ManagedEnvironmentStorage,
    Secret,
};
use reconcile_framework::mock::CallKind;
use reconcile_framework::{ReconcileError, RemoteError};
use serde_json::{json, Value};

fn secret_values(secrets: Option<Vec<Secret>>) -> Vec<(String, String)> {
    secrets
        .unwrap_or_default()
        .into_iter()
        .map(|secret| (secret.name.unwrap_or_default(), secret.value.unwrap_or_default()))
        .collect()
}

fn rick() -> Vec<(String, String)> {
    vec![("rick".to_string(), "morty".to_string())]
}

/// Create, read, update and delete an app against the simulated service.
#[tokio::test]
async fn test_container_app_lifecycle() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    environment_with_app(&provider).await;

    // Read fills in computed fields and re-sources secrets through listSecrets
    let current = read_app(&provider, &app()).await;
    assert_eq!(current.location, "westeurope");
    assert_eq!(current.secrets, app().secrets);
    assert_eq!(current.latest_revision_name, "foo--v1");
    assert!(current.ingress.as_ref().unwrap().fqdn.starts_with("foo.env1-"));
    assert!(plane.call_count(CallKind::ListSecrets) >= 1);

    // Update without a secret change keeps the secret value on the service
    let mut proposed = current.clone();
    proposed.template.containers[0].image = "mcr.microsoft.com/k8se/quickstart:v2".into();
    provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .expect("Failed to update app");

    let stored: ContainerApp = plane.stored(&app_id()).expect("App not stored");
    assert_eq!(secret_values(stored.configuration().and_then(|c| c.secrets.clone())), rick());
    let after = read_app(&provider, &proposed).await;
    assert_eq!(after.template.containers[0].image, "mcr.microsoft.com/k8se/quickstart:v2");

    // Delete twice
    provider.container_apps.delete(&app_id().to_string()).await.expect("Failed to delete app");
    provider
        .container_apps
        .delete(&app_id().to_string())
        .await
        .expect("Second delete should succeed");
    assert!(!plane.contains(&app_id()));

    let gone = provider
        .container_apps
        .read(&app_id().to_string(), Some(&after))
        .await
        .expect("Failed to read deleted app");
    assert!(gone.is_gone());
}

#[tokio::test]
async fn test_create_over_existing_object_requires_import() {
    let (provider, _plane) = Provider::in_memory(scope(), config());
    environment_with_app(&provider).await;

    let err = provider.container_apps.create(&app()).await.unwrap_err();
    assert!(err.is_already_exists());
    assert!(err.to_string().contains("needs to be imported"));

    let imported = provider
        .container_apps
        .import(&app_id().to_string())
        .await
        .expect("Failed to import app");
    assert_eq!(imported.name, "foo");
    assert_eq!(imported.secrets, app().secrets);
}

#[tokio::test]
async fn test_secret_removal_is_refused_without_remote_calls() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    environment_with_app(&provider).await;
    let current = read_app(&provider, &app()).await;

    let mut proposed = current.clone();
    proposed.secrets.clear();
    proposed.template.containers[0].env.clear();

    plane.clear_calls();
    let err = provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .unwrap_err();

    match &err {
        ReconcileError::UnsafeTransition { source, .. } => {
            assert_eq!(source.names, vec!["rick".to_string()]);
        }
        other => panic!("expected an unsafe transition, got {other:?}"),
    }
    assert!(plane.calls().is_empty());

    // Changing a secret's value is allowed
    let mut proposed = current.clone();
    proposed.secrets = vec![SecretModel::new("rick", "sanchez")];
    provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .expect("Failed to rotate secret");
    let stored: ContainerApp = plane.stored(&app_id()).expect("App not stored");
    assert_eq!(
        secret_values(stored.configuration().and_then(|c| c.secrets.clone())),
        vec![("rick".to_string(), "sanchez".to_string())]
    );
}

#[tokio::test]
async fn test_revision_suffix_handling() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    environment_with_app(&provider).await;
    assert_eq!(plane.revision_suffixes(&app_id()), vec!["v1".to_string()]);

    // A tags-only change does not start a new revision
    let current = read_app(&provider, &app()).await;
    let mut proposed = current.clone();
    proposed.tags.insert("team".into(), "platform".into());
    provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .expect("Failed to update tags");
    assert_eq!(plane.revision_suffixes(&app_id()), vec!["v1".to_string()]);

    // A template change with an unchanged suffix lets the service pick one
    let current = read_app(&provider, &proposed).await;
    let mut proposed = current.clone();
    proposed.template.max_replicas = 5;
    provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .expect("Failed to update template");
    let suffixes = plane.revision_suffixes(&app_id());
    assert_eq!(suffixes.len(), 2);
    assert_ne!(suffixes[1], "v1");

    // Asking for a used suffix again is a conflict reported by the service
    let current = read_app(&provider, &proposed).await;
    let mut proposed = current.clone();
    proposed.template.revision_suffix = "v1".into();
    let err = provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .unwrap_err();
    match err.remote_source() {
        Some(RemoteError::Status { status, code, .. }) => {
            assert_eq!(*status, 409);
            assert_eq!(code.as_deref(), Some("ContainerAppRevisionSuffixConflict"));
        }
        other => panic!("expected a 409 from the service, got {other:?}"),
    }

    // A fresh suffix is accepted
    proposed.template.revision_suffix = "v3".into();
    provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .expect("Failed to apply new suffix");
    let after = read_app(&provider, &proposed).await;
    assert_eq!(after.latest_revision_name, "foo--v3");
}

#[tokio::test]
async fn test_app_in_missing_environment_fails() {
    let (provider, plane) = Provider::in_memory(scope(), config());

    let err = provider.container_apps.create(&app()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::RemoteOperationFailed { .. }));
    assert!(err.remote_source().is_some_and(RemoteError::is_not_found));
    assert!(err.to_string().contains(&environment_id().to_string()));
    assert_eq!(plane.call_count(CallKind::CreateOrUpdate), 0);
}

#[tokio::test]
async fn test_environment_shared_key_survives_update() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    let id = provider
        .environments
        .create(&environment())
        .await
        .expect("Failed to create environment");

    let current = provider
        .environments
        .read(&id.to_string(), Some(&environment()))
        .await
        .expect("Failed to read environment")
        .into_model()
        .expect("Environment not found");
    assert_eq!(current.log_analytics_workspace_shared_key, "workspace-key");
    assert!(current.default_domain.ends_with(".westeurope.azurecontainerapps.io"));

    let mut proposed = current.clone();
    proposed.tags.insert("env".into(), "prod".into());
    provider
        .environments
        .update(&id.to_string(), &current, &proposed)
        .await
        .expect("Failed to update environment");

    let stored: ManagedEnvironment = plane.stored(&id).expect("Environment not stored");
    let analytics = stored
        .properties
        .and_then(|p| p.app_logs_configuration)
        .and_then(|logs| logs.log_analytics_configuration)
        .expect("Log analytics configuration dropped");
    assert_eq!(analytics.shared_key.as_deref(), Some("workspace-key"));
    assert_eq!(stored.tags.unwrap().get("env").map(String::as_str), Some("prod"));
}

#[tokio::test]
async fn test_environment_logging_can_be_switched_off() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    let id = provider
        .environments
        .create(&environment())
        .await
        .expect("Failed to create environment");
    let current = provider
        .environments
        .read(&id.to_string(), Some(&environment()))
        .await
        .expect("Failed to read environment")
        .into_model()
        .expect("Environment not found");

    let mut proposed = current.clone();
    proposed.log_analytics_workspace_customer_id.clear();
    proposed.log_analytics_workspace_shared_key.clear();
    provider
        .environments
        .update(&id.to_string(), &current, &proposed)
        .await
        .expect("Failed to switch logging off");

    let stored: ManagedEnvironment = plane.stored(&id).expect("Environment not stored");
    assert_eq!(stored.properties.and_then(|p| p.app_logs_configuration), None);

    let after = provider
        .environments
        .read(&id.to_string(), Some(&proposed))
        .await
        .expect("Failed to read environment")
        .into_model()
        .expect("Environment not found");
    assert_eq!(after.log_analytics_workspace_customer_id, "");
    assert_eq!(after.log_analytics_workspace_shared_key, "");
}

#[tokio::test]
async fn test_unmodelled_fields_survive_update() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    environment_with_app(&provider).await;

    // Set through another client; none of these are modelled here
    plane.edit_stored(&app_id(), |app| {
        app["identity"] = json!({"type": "SystemAssigned"});
        let properties = &mut app["properties"];
        properties["configuration"]["maxInactiveRevisions"] = json!(10);
        properties["template"]["initContainers"] = json!([{"name": "migrate", "image": "tools"}]);
        properties["template"]["containers"][0]["probes"] =
            json!([{"type": "Liveness", "httpGet": {"path": "/healthz", "port": 80}}]);
    });

    let current = read_app(&provider, &app()).await;
    let mut proposed = current.clone();
    proposed.template.containers[0].image = "mcr.microsoft.com/k8se/quickstart:v2".into();
    proposed.ingress.as_mut().expect("App has ingress").target_port = 8080;
    provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .expect("Failed to update app");

    let stored: Value = plane.stored(&app_id()).expect("App not stored");
    let properties = &stored["properties"];
    assert_eq!(stored["identity"]["type"], "SystemAssigned");
    assert_eq!(properties["configuration"]["maxInactiveRevisions"], 10);
    assert_eq!(properties["configuration"]["ingress"]["targetPort"], 8080);
    assert_eq!(properties["template"]["initContainers"][0]["name"], "migrate");
    let container = &properties["template"]["containers"][0];
    assert_eq!(container["image"], "mcr.microsoft.com/k8se/quickstart:v2");
    assert_eq!(container["probes"][0]["httpGet"]["path"], "/healthz");
}

#[tokio::test]
async fn test_creation_only_changes_are_refused() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    environment_with_app(&provider).await;
    let certificate_id = provider
        .certificates
        .create(&certificate("cert1"))
        .await
        .expect("Failed to create certificate");

    // Environment networking
    let current = provider
        .environments
        .read(&environment_id().to_string(), Some(&environment()))
        .await
        .expect("Failed to read environment")
        .into_model()
        .expect("Environment not found");
    let mut proposed = current.clone();
    proposed.infrastructure_subnet_id =
        "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/v/subnets/s"
            .into();

    plane.clear_calls();
    let err = provider
        .environments
        .update(&environment_id().to_string(), &current, &proposed)
        .await
        .unwrap_err();
    match &err {
        ReconcileError::UnsafeTransition { source, .. } => {
            assert_eq!(source.names, vec!["infrastructure_subnet_id".to_string()]);
            assert!(source.message.contains("Managed Environments"));
        }
        other => panic!("expected an unsafe transition, got {other:?}"),
    }
    assert!(plane.calls().is_empty());

    // Moving an app to another environment
    let current = read_app(&provider, &app()).await;
    let mut proposed = current.clone();
    proposed.container_app_environment_id =
        ManagedEnvironmentId::new("sub", "rg1", "env2").to_string();

    plane.clear_calls();
    let err = provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .unwrap_err();
    assert!(err.is_unsafe_transition());
    assert!(plane.calls().is_empty());

    // New certificate material
    let current = provider
        .certificates
        .read(&certificate_id.to_string(), Some(&certificate("cert1")))
        .await
        .expect("Failed to read certificate")
        .into_model()
        .expect("Certificate not found");
    let mut proposed = current.clone();
    proposed.certificate_blob_base64 =
        "MIIKcQIBAzCCCjcGCSqGSIb3DQEHAaCCCigEggokMIIKIDCCBNcGCSqGSIb4".into();

    plane.clear_calls();
    let err = provider
        .certificates
        .update(&certificate_id.to_string(), &current, &proposed)
        .await
        .unwrap_err();
    assert!(err.is_unsafe_transition());

    assert!(plane.calls().is_empty());
    let stored: Certificate = plane.stored(&certificate_id).expect("Certificate not stored");
    assert_eq!(
        stored.properties.and_then(|p| p.value),
        Some(certificate("cert1").certificate_blob_base64)
    );
}

#[tokio::test]
async fn test_job_secrets_survive_update() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    provider.environments.create(&environment()).await.expect("Failed to create environment");

    let job = JobModel {
        name: "nightly".into(),
        resource_group_name: "rg1".into(),
        location: "westeurope".into(),
        container_app_environment_id: environment_id().to_string(),
        replica_timeout_in_seconds: 300,
        replica_retry_limit: 1,
        secrets: vec![SecretModel::new("rick", "morty")],
        schedule_trigger_config: Some(ScheduleTriggerModel {
            cron_expression: "0 2 * * *".into(),
            parallelism: 1,
            replica_completion_count: 1,
        }),
        template: JobTemplateModel {
            containers: vec![ContainerModel {
                name: "batch".into(),
                image: "mcr.microsoft.com/k8se/quickstart-jobs:latest".into(),
                cpu: 0.5,
                memory: "1Gi".into(),
                ..Default::default()
            }],
            volumes: Vec::new(),
        },
        ..Default::default()
    };
    let id = provider.jobs.create(&job).await.expect("Failed to create job");
    assert_eq!(id, JobId::new("sub", "rg1", "nightly"));

    let current = provider
        .jobs
        .read(&id.to_string(), Some(&job))
        .await
        .expect("Failed to read job")
        .into_model()
        .expect("Job not found");
    assert_eq!(current.secrets, job.secrets);

    let mut proposed = current.clone();
    proposed.replica_timeout_in_seconds = 600;
    provider
        .jobs
        .update(&id.to_string(), &current, &proposed)
        .await
        .expect("Failed to update job");

    let stored: Job = plane.stored(&id).expect("Job not stored");
    let configuration = stored.configuration().expect("Job has no configuration");
    assert_eq!(configuration.replica_timeout, Some(600));
    assert_eq!(secret_values(configuration.secrets.clone()), rick());

    // The removal guard covers jobs too
    let mut without = proposed.clone();
    without.secrets.clear();
    let err = provider.jobs.update(&id.to_string(), &proposed, &without).await.unwrap_err();
    assert!(err.is_unsafe_transition());
}

#[tokio::test]
async fn test_dapr_component_secrets_survive_update() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    provider.environments.create(&environment()).await.expect("Failed to create environment");

    let component = DaprComponentModel {
        name: "statestore".into(),
        container_app_environment_id: environment_id().to_string(),
        component_type: "state.azure.blobstorage".into(),
        version: "v1".into(),
        secrets: vec![SecretModel::new("rick", "morty")],
        metadata: vec![DaprMetadataModel {
            name: "accountKey".into(),
            secret_name: "rick".into(),
            ..Default::default()
        }],
        scopes: vec!["orders".into()],
        ..Default::default()
    };
    let id = provider
        .dapr_components
        .create(&component)
        .await
        .expect("Failed to create Dapr component");
    assert_eq!(id, DaprComponentId::new("sub", "rg1", "env1", "statestore"));

    let current = provider
        .dapr_components
        .read(&id.to_string(), None)
        .await
        .expect("Failed to read Dapr component")
        .into_model()
        .expect("Dapr component not found");
    assert_eq!(current, component);

    let mut proposed = current.clone();
    proposed.scopes.push("payments".into());
    provider
        .dapr_components
        .update(&id.to_string(), &current, &proposed)
        .await
        .expect("Failed to update Dapr component");

    let stored: DaprComponent = plane.stored(&id).expect("Dapr component not stored");
    let properties = stored.properties.expect("Dapr component has no properties");
    assert_eq!(secret_values(properties.secrets), rick());
    assert_eq!(properties.scopes.unwrap().len(), 2);
}

#[tokio::test]
async fn test_certificate_blob_comes_from_prior_state() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    provider.environments.create(&environment()).await.expect("Failed to create environment");

    let desired = certificate("cert1");
    let id = provider.certificates.create(&desired).await.expect("Failed to create certificate");
    assert_eq!(id, CertificateId::new("sub", "rg1", "env1", "cert1"));

    let current = provider
        .certificates
        .read(&id.to_string(), Some(&desired))
        .await
        .expect("Failed to read certificate")
        .into_model()
        .expect("Certificate not found");
    assert_eq!(current.certificate_blob_base64, desired.certificate_blob_base64);
    assert!(!current.thumbprint.is_empty());

    let mut proposed = current.clone();
    proposed.tags.insert("owner".into(), "web".into());
    provider
        .certificates
        .update(&id.to_string(), &current, &proposed)
        .await
        .expect("Failed to update certificate");

    let stored: Certificate = plane.stored(&id).expect("Certificate not stored");
    let properties = stored.properties.expect("Certificate has no properties");
    assert_eq!(properties.value, Some(desired.certificate_blob_base64.clone()));
    assert_eq!(properties.password, Some(desired.certificate_password.clone()));

    // The blob is write-only, so an import cannot recover it
    let imported = provider.certificates.import(&id.to_string()).await.expect("Failed to import");
    assert_eq!(imported.certificate_blob_base64, "");
}

#[tokio::test]
async fn test_storage_key_comes_from_prior_state() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    provider.environments.create(&environment()).await.expect("Failed to create environment");

    let desired = EnvironmentStorageModel {
        name: "share1".into(),
        container_app_environment_id: environment_id().to_string(),
        account_name: "examplestorage".into(),
        access_key: "c2VjcmV0".into(),
        share_name: "content".into(),
        access_mode: "ReadOnly".into(),
    };
    let id = provider.storages.create(&desired).await.expect("Failed to create storage");
    assert_eq!(id, EnvironmentStorageId::new("sub", "rg1", "env1", "share1"));

    let current = provider
        .storages
        .read(&id.to_string(), Some(&desired))
        .await
        .expect("Failed to read storage")
        .into_model()
        .expect("Storage not found");
    assert_eq!(current, desired);

    let mut proposed = current.clone();
    proposed.access_mode = "ReadWrite".into();
    provider
        .storages
        .update(&id.to_string(), &current, &proposed)
        .await
        .expect("Failed to update storage");

    let stored: ManagedEnvironmentStorage = plane.stored(&id).expect("Storage not stored");
    let azure_file = stored.properties.and_then(|p| p.azure_file).expect("Storage has no share");
    assert_eq!(azure_file.account_key.as_deref(), Some("c2VjcmV0"));
    assert_eq!(azure_file.access_mode.as_deref(), Some("ReadWrite"));
}

#[tokio::test]
async fn test_long_running_operations_are_awaited() {
    use containerapps::api::InMemoryControlPlane;
    use std::sync::Arc;

    let plane = Arc::new(InMemoryControlPlane::new().with_completion_polls(3));
    let provider = Provider::new(plane.clone(), scope(), config());

    environment_with_app(&provider).await;
    assert!(plane.contains(&app_id()));

    provider.container_apps.delete(&app_id().to_string()).await.expect("Failed to delete app");
    assert!(!plane.contains(&app_id()));
}
