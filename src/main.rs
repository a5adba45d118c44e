//! # Container Apps Reconciler Demo
//!
//! Walks one environment through its whole lifecycle against the
//! [`InMemoryControlPlane`](containerapps::api::InMemoryControlPlane):
//!
//! 1.  Create a Managed Environment.
//! 2.  Create a Container App with a secret.
//! 3.  Upload a certificate and bind two custom domains to the app.
//! 4.  Update the app without touching its secrets.
//! 5.  Try to remove a secret, which is refused before any remote call.
//! 6.  Delete everything, twice.
//!
//! Pass a TOML engine configuration path as the first argument to override the default
//! deadlines.

use containerapps::ids::ManagedEnvironmentId;
use containerapps::lifecycle::{setup_tracing, Provider};
use containerapps::mapper::{
    ContainerModel, EnvVarModel, IngressModel, SecretModel, TemplateModel, TrafficWeightModel,
};
use containerapps::resources::{
    CertificateModel, ContainerAppCustomDomainModel, ContainerAppModel, ManagedEnvironmentModel,
};
use containerapps::wire::ContainerApp;
use reconcile_framework::mock::CallKind;
use reconcile_framework::{EngineConfig, Scope};
use tracing::{error, info, Instrument};

const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const RESOURCE_GROUP: &str = "demo-rg";

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    info!(?config, "Starting Container Apps demo");

    let (provider, plane) = Provider::in_memory(Scope::new(SUBSCRIPTION), config);

    // 1. Environment
    let environment = ManagedEnvironmentModel {
        name: "demo-env".into(),
        resource_group_name: RESOURCE_GROUP.into(),
        location: "westeurope".into(),
        ..Default::default()
    };
    let environment_id = async {
        provider
            .environments
            .create(&environment)
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(tracing::info_span!("environment_creation"))
    .await?;
    info!(id = %environment_id, "Environment created");

    // 2. App with a secret
    let app = demo_app(&environment_id);
    let app_id = async {
        provider
            .container_apps
            .create(&app)
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(tracing::info_span!("app_creation"))
    .await?;
    info!(id = %app_id, "Container App created");

    // 3. Certificate and custom domains
    let span = tracing::info_span!("custom_domains");
    let (certificate_id, domain_ids) = async {
        let certificate = CertificateModel {
            name: "demo-cert".into(),
            container_app_environment_id: environment_id.to_string(),
            certificate_blob_base64: "MIIDemoCertificate".into(),
            certificate_password: "demo".into(),
            ..Default::default()
        };
        let certificate_id = provider
            .certificates
            .create(&certificate)
            .await
            .map_err(|e| e.to_string())?;
        info!(id = %certificate_id, "Certificate uploaded");

        let mut ids = Vec::new();
        for hostname in ["www.example.com", "api.example.com"] {
            let mut binding = ContainerAppCustomDomainModel::new(&app_id, hostname);
            binding.container_app_environment_certificate_id = certificate_id.to_string();
            let id = provider
                .custom_domains
                .create(&binding)
                .await
                .map_err(|e| e.to_string())?;
            info!(%id, "Custom domain bound");
            ids.push(id);
        }
        Ok::<_, String>((certificate_id, ids))
    }
    .instrument(span)
    .await?;

    // 4. Update without secret change
    let span = tracing::info_span!("app_update");
    let updated = async {
        let current = provider
            .container_apps
            .read(&app_id.to_string(), Some(&app))
            .await
            .map_err(|e| e.to_string())?
            .into_model()
            .ok_or("the app disappeared")?;

        let mut proposed = current.clone();
        proposed.template.containers[0].image = "mcr.microsoft.com/k8se/quickstart:v2".into();
        provider
            .container_apps
            .update(&app_id.to_string(), &current, &proposed)
            .await
            .map_err(|e| e.to_string())?;

        let secrets = plane
            .stored::<ContainerApp>(&app_id)
            .and_then(|stored| stored.configuration().and_then(|c| c.secrets.clone()))
            .map_or(0, |secrets| secrets.len());
        info!(secrets, "App updated; secrets preserved");
        Ok::<_, String>(proposed)
    }
    .instrument(span)
    .await?;

    // 5. Rejected secret removal
    let span = tracing::info_span!("secret_removal");
    async {
        let mut proposed = updated.clone();
        proposed.secrets.clear();
        proposed.template.containers[0].env.clear();

        plane.clear_calls();
        match provider
            .container_apps
            .update(&app_id.to_string(), &updated, &proposed)
            .await
        {
            Ok(()) => error!("Secret removal was unexpectedly accepted"),
            Err(e) if e.is_unsafe_transition() => {
                info!(error = %e, remote_calls = plane.calls().len(), "Secret removal refused")
            }
            Err(e) => error!(error = %e, "Secret removal failed for another reason"),
        }
    }
    .instrument(span)
    .await;

    // 6. Idempotent delete
    let span = tracing::info_span!("teardown");
    async {
        for id in &domain_ids {
            provider.custom_domains.delete(&id.to_string()).await?;
        }
        provider.certificates.delete(&certificate_id.to_string()).await?;
        for _ in 0..2 {
            provider.container_apps.delete(&app_id.to_string()).await?;
        }
        provider.environments.delete(&environment_id.to_string()).await?;
        info!(deletes = plane.call_count(CallKind::Delete), "Teardown complete");
        Ok::<_, reconcile_framework::ReconcileError>(())
    }
    .instrument(span)
    .await
    .map_err(|e| e.to_string())?;

    info!("Demo finished");
    Ok(())
}

fn demo_app(environment_id: &ManagedEnvironmentId) -> ContainerAppModel {
    ContainerAppModel {
        name: "demo-app".into(),
        resource_group_name: RESOURCE_GROUP.into(),
        container_app_environment_id: environment_id.to_string(),
        revision_mode: "Single".into(),
        secrets: vec![SecretModel::new("db-password", "correct-horse")],
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
                    name: "DB_PASSWORD".into(),
                    secret_name: "db-password".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            revision_suffix: "initial".into(),
            max_replicas: 3,
            ..Default::default()
        },
        ..Default::default()
    }
}
