use crate::api::{
    ArmClient, ArmConfig, CertificatesApi, ContainerAppsApi, ControlPlane, DaprComponentsApi,
    EnvironmentsApi, InMemoryControlPlane, JobsApi, ManagedCertificatesApi, StoragesApi,
    TokenSource,
};
use crate::resources::{
    CertificateResource, ContainerAppResource, CustomDomainResource, DaprComponentResource,
    EnvironmentStorageResource, JobResource, ManagedCertificateResource, ManagedEnvironmentResource,
};
use reconcile_framework::{
    CollectionReconciler, EngineConfig, KeyedLocks, LockCoordinator, Reconciler, RemoteError, Scope,
};
use std::sync::Arc;
use tracing::info;

/// One reconciler per resource kind over a shared control plane.
///
/// Every reconciler uses the same lock coordinator. A custom domain holds its app and its
/// certificate; a certificate update holds the certificate. Sharing the coordinator is
/// what makes those two exclude each other.
///
/// # Example
///
/// ```ignore
/// let (provider, _plane) = Provider::in_memory(Scope::new("sub"), EngineConfig::immediate());
///
/// let environment_id = provider.environments.create(&environment).await?;
/// let app_id = provider.container_apps.create(&app).await?;
/// let binding = ContainerAppCustomDomainModel::new(&app_id, "a.example.com");
/// provider.custom_domains.create(&binding).await?;
/// ```
pub struct Provider {
    pub environments: Reconciler<ManagedEnvironmentResource>,
    pub container_apps: Reconciler<ContainerAppResource>,
    pub jobs: Reconciler<JobResource>,
    pub certificates: Reconciler<CertificateResource>,
    pub managed_certificates: Reconciler<ManagedCertificateResource>,
    pub dapr_components: Reconciler<DaprComponentResource>,
    pub storages: Reconciler<EnvironmentStorageResource>,
    pub custom_domains: CollectionReconciler<CustomDomainResource>,
}

impl Provider {
    pub fn new<A: ControlPlane + 'static>(api: Arc<A>, scope: Scope, config: EngineConfig) -> Self {
        Self::with_locks(api, Arc::new(KeyedLocks::new()), scope, config)
    }

    /// Like [`Provider::new`] with a caller-supplied lock coordinator.
    pub fn with_locks<A: ControlPlane + 'static>(
        api: Arc<A>,
        locks: Arc<dyn LockCoordinator>,
        scope: Scope,
        config: EngineConfig,
    ) -> Self {
        info!(subscription_id = %scope.subscription_id, "Building provider");

        let environments: Arc<dyn EnvironmentsApi> = api.clone();
        let container_apps: Arc<dyn ContainerAppsApi> = api.clone();
        let jobs: Arc<dyn JobsApi> = api.clone();
        let certificates: Arc<dyn CertificatesApi> = api.clone();
        let managed_certificates: Arc<dyn ManagedCertificatesApi> = api.clone();
        let dapr_components: Arc<dyn DaprComponentsApi> = api.clone();
        let storages: Arc<dyn StoragesApi> = api;

        Self {
            environments: Reconciler::new(
                environments,
                locks.clone(),
                scope.clone(),
                config.clone(),
            ),
            container_apps: Reconciler::new(
                container_apps.clone(),
                locks.clone(),
                scope.clone(),
                config.clone(),
            ),
            jobs: Reconciler::new(jobs, locks.clone(), scope.clone(), config.clone()),
            certificates: Reconciler::new(
                certificates,
                locks.clone(),
                scope.clone(),
                config.clone(),
            ),
            managed_certificates: Reconciler::new(
                managed_certificates,
                locks.clone(),
                scope.clone(),
                config.clone(),
            ),
            dapr_components: Reconciler::new(
                dapr_components,
                locks.clone(),
                scope.clone(),
                config.clone(),
            ),
            storages: Reconciler::new(storages, locks.clone(), scope, config.clone()),
            custom_domains: CollectionReconciler::new(container_apps, locks, config),
        }
    }

    /// A provider over a fresh [`InMemoryControlPlane`], which is handed back for inspection.
    pub fn in_memory(scope: Scope, config: EngineConfig) -> (Self, Arc<InMemoryControlPlane>) {
        let plane = Arc::new(InMemoryControlPlane::new());
        (Self::new(plane.clone(), scope, config), plane)
    }

    /// A provider talking to Azure Resource Manager.
    pub fn arm(
        arm: ArmConfig,
        token: Arc<dyn TokenSource>,
        scope: Scope,
        config: EngineConfig,
    ) -> Result<Self, RemoteError> {
        let client = ArmClient::new(arm, token)?;
        Ok(Self::new(Arc::new(client), scope, config))
    }
}
