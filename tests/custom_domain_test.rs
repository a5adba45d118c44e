mod common;

use common::{app, app_id, certificate, config, environment_with_app, read_app, scope};
use containerapps::api::InMemoryControlPlane;
use containerapps::ids::CertificateId;
use containerapps::lifecycle::Provider;
use containerapps::resources::ContainerAppCustomDomainModel;
use containerapps::wire::ContainerApp;
use reconcile_framework::mock::RecordingLocks;
use reconcile_framework::{LockKey, RemoteError, ResourceId};
use std::sync::Arc;
use std::time::Duration;

async fn with_certificate(provider: &Provider) -> CertificateId {
    environment_with_app(provider).await;
    provider
        .certificates
        .create(&certificate("cert1"))
        .await
        .expect("Failed to create certificate")
}

fn binding(hostname: &str, certificate: &CertificateId) -> ContainerAppCustomDomainModel {
    let mut model = ContainerAppCustomDomainModel::new(&app_id(), hostname);
    model.container_app_environment_certificate_id = certificate.to_string();
    model
}

fn bound_hostnames(plane: &InMemoryControlPlane) -> Vec<String> {
    let stored: ContainerApp = plane.stored(&app_id()).expect("App not stored");
    stored
        .ingress()
        .and_then(|ingress| ingress.custom_domains.clone())
        .unwrap_or_default()
        .into_iter()
        .map(|domain| domain.name)
        .collect()
}

/// Bind two hostnames with one certificate, then unbind them.
#[tokio::test]
async fn test_bind_and_unbind_custom_domains() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    let certificate_id = with_certificate(&provider).await;

    let www = provider
        .custom_domains
        .create(&binding("www.example.com", &certificate_id))
        .await
        .expect("Failed to bind www");
    let api = provider
        .custom_domains
        .create(&binding("api.example.com", &certificate_id))
        .await
        .expect("Failed to bind api");
    assert_eq!(www.to_string(), format!("{}/customDomainName/www.example.com", app_id()));
    assert_eq!(bound_hostnames(&plane), vec!["www.example.com", "api.example.com"]);

    // The rewrites kept the app's secrets and its revision
    let stored: ContainerApp = plane.stored(&app_id()).expect("App not stored");
    let secrets = stored.configuration().and_then(|c| c.secrets.clone()).unwrap_or_default();
    assert_eq!(secrets[0].value.as_deref(), Some("morty"));
    assert_eq!(plane.revision_suffixes(&app_id()), vec!["v1".to_string()]);

    let read = provider
        .custom_domains
        .read(&www.to_string())
        .await
        .expect("Failed to read binding")
        .into_model()
        .expect("Binding not found");
    assert_eq!(read.certificate_binding_type, "SniEnabled");
    assert_eq!(read.container_app_environment_certificate_id, certificate_id.to_string());

    provider.custom_domains.delete(&www.to_string()).await.expect("Failed to unbind www");
    provider
        .custom_domains
        .delete(&www.to_string())
        .await
        .expect("Second unbind should succeed");
    assert_eq!(bound_hostnames(&plane), vec!["api.example.com"]);

    let gone = provider.custom_domains.read(&www.to_string()).await.expect("Failed to read");
    assert!(gone.is_gone());

    // Once the app is gone, so is every binding on it
    provider.container_apps.delete(&app_id().to_string()).await.expect("Failed to delete app");
    provider
        .custom_domains
        .delete(&api.to_string())
        .await
        .expect("Unbinding from a deleted app should succeed");
}

#[tokio::test]
async fn test_binding_twice_requires_import() {
    let (provider, _plane) = Provider::in_memory(scope(), config());
    let certificate_id = with_certificate(&provider).await;
    let desired = binding("www.example.com", &certificate_id);

    let id = provider.custom_domains.create(&desired).await.expect("Failed to bind");
    let err = provider.custom_domains.create(&desired).await.unwrap_err();
    assert!(err.is_already_exists());

    let imported = provider
        .custom_domains
        .import(&id.to_string())
        .await
        .expect("Failed to import binding");
    assert_eq!(imported.name, "www.example.com");
    assert_eq!(imported.container_app_id, app_id().to_string());
}

#[tokio::test]
async fn test_concurrent_bindings_are_not_lost() {
    let plane = Arc::new(InMemoryControlPlane::new().with_latency(Duration::from_millis(5)));
    let provider = Provider::new(plane.clone(), scope(), config());
    let certificate_id = with_certificate(&provider).await;

    let hostnames = ["a.example.com", "b.example.com", "c.example.com", "d.example.com"];
    let mut tasks = Vec::new();
    for hostname in hostnames {
        let domains = provider.custom_domains.clone();
        let desired = binding(hostname, &certificate_id);
        tasks.push(tokio::spawn(async move { domains.create(&desired).await }));
    }
    for task in tasks {
        task.await.expect("Task panicked").expect("Failed to bind");
    }

    let mut bound = bound_hostnames(&plane);
    bound.sort();
    assert_eq!(bound, hostnames);
}

#[tokio::test]
async fn test_binding_locks_app_then_certificate() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let setup = Provider::new(plane.clone(), scope(), config());
    let certificate_id = with_certificate(&setup).await;

    let locks = RecordingLocks::new();
    let provider = Provider::with_locks(plane.clone(), Arc::new(locks.clone()), scope(), config());
    provider
        .custom_domains
        .create(&binding("www.example.com", &certificate_id))
        .await
        .expect("Failed to bind");

    assert_eq!(
        locks.acquired(),
        vec![app_id().lock_key(), LockKey::new(certificate_id.to_string())]
    );
    assert!(locks.all_released());
}

#[tokio::test]
async fn test_binding_to_missing_certificate_is_rejected() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    let certificate_id = with_certificate(&provider).await;
    let missing = CertificateId::new("sub", "rg1", "env1", "nope");

    let err = provider
        .custom_domains
        .create(&binding("www.example.com", &missing))
        .await
        .unwrap_err();
    match err.remote_source() {
        Some(RemoteError::Status { status, code, message }) => {
            assert_eq!(*status, 400);
            assert_eq!(code.as_deref(), Some("CertificateNotFound"));
            assert!(message.contains("www.example.com"));
        }
        other => panic!("expected a 400 from the service, got {other:?}"),
    }
    assert!(bound_hostnames(&plane).is_empty());

    // The real certificate still works afterwards
    provider
        .custom_domains
        .create(&binding("www.example.com", &certificate_id))
        .await
        .expect("Failed to bind");
}

#[tokio::test]
async fn test_app_update_keeps_bindings() {
    let (provider, plane) = Provider::in_memory(scope(), config());
    let certificate_id = with_certificate(&provider).await;
    provider
        .custom_domains
        .create(&binding("www.example.com", &certificate_id))
        .await
        .expect("Failed to bind");

    // Bindings belong to the custom-domain resources, not to the app's ingress block
    let current = read_app(&provider, &app()).await;
    let mut proposed = current.clone();
    if let Some(ingress) = proposed.ingress.as_mut() {
        ingress.target_port = 8080;
        ingress.custom_domains.clear();
    }
    provider
        .container_apps
        .update(&app_id().to_string(), &current, &proposed)
        .await
        .expect("Failed to update app");

    let stored: ContainerApp = plane.stored(&app_id()).expect("App not stored");
    let ingress = stored.ingress().expect("Ingress dropped");
    assert_eq!(ingress.target_port, Some(8080));
    assert_eq!(bound_hostnames(&plane), vec!["www.example.com"]);
}
