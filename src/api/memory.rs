//! # In-memory control plane
//!
//! [`InMemoryControlPlane`] stands in for the `Microsoft.App` service in tests and in the
//! demo. Objects are held as the JSON the service would store, and it enforces the service
//! behaviours the reconcilers have to cope with:
//!
//! | Behaviour | Kinds |
//! |-----------|-------|
//! | GET leaves out secret values | secrets, certificate blob and password, storage key, shared key |
//! | `listSecrets` returns the stored values | apps, jobs, Dapr components |
//! | A secret without a value or Key Vault URL is rejected (400) | apps, jobs, Dapr components |
//! | A write under a missing environment is rejected (404) | everything but environments |
//! | Re-sending a revision suffix the app already used is rejected (409) | apps |
//! | Binding a hostname to a missing certificate is rejected (400) | apps |
//! | A log analytics configuration without its shared key is rejected (400) | environments |
//! | Omitting the logs block keeps the stored one; an empty block turns logging off | environments |
//! | Members the wire models do not know are stored and returned as sent | all |
//! | A certificate without its blob is rejected (400) | certificates |
//!
//! Computed fields (FQDNs, default domain, thumbprint, provisioning state) are filled in on
//! every accepted write. [`InMemoryControlPlane::with_completion_polls`] makes writes and
//! deletes long-running.

use crate::ids::{
    AnyCertificateId, CertificateId, ContainerAppId, DaprComponentId, EnvironmentStorageId, JobId,
    ManagedCertificateId, ManagedEnvironmentId,
};
use crate::wire::{
    AppLogsConfiguration, Certificate, ContainerApp, CustomDomain, DaprComponent, Job,
    ManagedCertificate, ManagedEnvironment, ManagedEnvironmentStorage, Secret, Template,
};
use async_trait::async_trait;
use reconcile_framework::id::ResourceId;
use reconcile_framework::mock::{Call, CallKind};
use reconcile_framework::{PollStatus, Poller, RemoteApi, RemoteError, SecretLister, Submission};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

const SUCCEEDED: &str = "Succeeded";
const OUTBOUND_IP: &str = "20.105.44.17";

#[derive(Default)]
struct State {
    objects: HashMap<String, Value>,
    /// Revision suffixes used per app, including generated ones.
    revisions: HashMap<String, Vec<String>>,
    calls: Vec<Call>,
}

impl State {
    fn load<W: DeserializeOwned>(&self, key: &str) -> Result<Option<W>, RemoteError> {
        self.objects
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    fn contains<I: ResourceId>(&self, id: &I) -> bool {
        self.objects.contains_key(&key_of(id))
    }

    fn require<I: ResourceId>(&self, parent: &I) -> Result<(), RemoteError> {
        if self.contains(parent) {
            Ok(())
        } else {
            Err(parent_missing(parent))
        }
    }

    fn record(&mut self, kind: CallKind, key: &str) {
        self.calls.push(Call {
            kind,
            id: key.to_string(),
        });
    }
}

/// A wire model the plane stores, with the service rules for its kind.
trait Hosted: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: ResourceId;

    /// Validate a write and assign the fields the service computes.
    fn admit(
        &mut self,
        id: &Self::Id,
        stored: Option<Self>,
        state: &mut State,
    ) -> Result<(), RemoteError>;

    /// Blank the values GET never returns.
    fn redact(&mut self) {}

    fn secrets(&self) -> Vec<Secret> {
        Vec::new()
    }

    /// Drop bookkeeping kept for a deleted object.
    fn forget(_key: &str, _state: &mut State) {}
}

pub struct InMemoryControlPlane {
    state: Mutex<State>,
    completion_polls: usize,
    latency: Duration,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            completion_polls: 0,
            latency: Duration::ZERO,
        }
    }

    /// Writes and deletes return a poller that reports success after `polls` polls.
    pub fn with_completion_polls(mut self, polls: usize) -> Self {
        self.completion_polls = polls;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock_state().calls.clone()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.lock_state().calls.iter().filter(|call| call.kind == kind).count()
    }

    pub fn clear_calls(&self) {
        self.lock_state().calls.clear();
    }

    pub fn contains<I: ResourceId>(&self, id: &I) -> bool {
        self.lock_state().contains(id)
    }

    /// The object as the service holds it, secret values included.
    pub fn stored<W: DeserializeOwned>(&self, id: &impl ResourceId) -> Option<W> {
        self.lock_state().load(&key_of(id)).ok().flatten()
    }

    /// Change the stored JSON in place, as a client other than this crate would.
    pub fn edit_stored(&self, id: &impl ResourceId, edit: impl FnOnce(&mut Value)) {
        if let Some(value) = self.lock_state().objects.get_mut(&key_of(id)) {
            edit(value);
        }
    }

    /// Every revision suffix `app` has used, oldest first.
    pub fn revision_suffixes(&self, app: &ContainerAppId) -> Vec<String> {
        self.lock_state()
            .revisions
            .get(&key_of(app))
            .cloned()
            .unwrap_or_default()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn submission(&self) -> Submission {
        match self.completion_polls {
            0 => Submission::Completed,
            polls => Submission::Pending(Box::new(Countdown { remaining: polls })),
        }
    }

    async fn get_object<W: Hosted>(&self, id: &W::Id) -> Result<Option<W>, RemoteError> {
        self.pause().await;
        let key = key_of(id);
        let mut state = self.lock_state();
        state.record(CallKind::Get, &key);

        let mut found: Option<W> = state.load(&key)?;
        if let Some(object) = found.as_mut() {
            object.redact();
        }
        Ok(found)
    }

    async fn put_object<W: Hosted>(
        &self,
        id: &W::Id,
        mut object: W,
    ) -> Result<Submission, RemoteError> {
        self.pause().await;
        let key = key_of(id);
        let mut state = self.lock_state();
        state.record(CallKind::CreateOrUpdate, &key);

        let stored: Option<W> = state.load(&key)?;
        if let Err(e) = object.admit(id, stored, &mut state) {
            debug!(kind = <W::Id as ResourceId>::KIND, %id, error = %e, "Write rejected");
            return Err(e);
        }
        let value = serde_json::to_value(&object).map_err(|e| RemoteError::Decode(e.to_string()))?;
        state.objects.insert(key, value);
        drop(state);

        Ok(self.submission())
    }

    async fn delete_object<W: Hosted>(&self, id: &W::Id) -> Result<Submission, RemoteError> {
        self.pause().await;
        let key = key_of(id);
        let mut state = self.lock_state();
        state.record(CallKind::Delete, &key);

        if state.objects.remove(&key).is_none() {
            return Err(RemoteError::NotFound);
        }
        W::forget(&key, &mut state);
        drop(state);

        Ok(self.submission())
    }

    async fn list_secrets_of<W: Hosted>(&self, id: &W::Id) -> Result<Vec<Secret>, RemoteError> {
        self.pause().await;
        let key = key_of(id);
        let mut state = self.lock_state();
        state.record(CallKind::ListSecrets, &key);

        let object: W = state.load(&key)?.ok_or(RemoteError::NotFound)?;
        Ok(object.secrets())
    }
}

macro_rules! serve {
    ($($id:ty => $wire:ty),+ $(,)?) => {
        $(
            #[async_trait]
            impl RemoteApi<$id, $wire> for InMemoryControlPlane {
                async fn get(&self, id: &$id) -> Result<Option<$wire>, RemoteError> {
                    self.get_object::<$wire>(id).await
                }

                async fn create_or_update(
                    &self,
                    id: &$id,
                    model: $wire,
                ) -> Result<Submission, RemoteError> {
                    self.put_object::<$wire>(id, model).await
                }

                async fn delete(&self, id: &$id) -> Result<Submission, RemoteError> {
                    self.delete_object::<$wire>(id).await
                }
            }
        )+
    };
}

serve! {
    ManagedEnvironmentId => ManagedEnvironment,
    ContainerAppId => ContainerApp,
    JobId => Job,
    CertificateId => Certificate,
    ManagedCertificateId => ManagedCertificate,
    DaprComponentId => DaprComponent,
    EnvironmentStorageId => ManagedEnvironmentStorage,
}

macro_rules! list_secrets {
    ($($id:ty => $wire:ty),+ $(,)?) => {
        $(
            #[async_trait]
            impl SecretLister<$id, Secret> for InMemoryControlPlane {
                async fn list_secrets(&self, id: &$id) -> Result<Vec<Secret>, RemoteError> {
                    self.list_secrets_of::<$wire>(id).await
                }
            }
        )+
    };
}

list_secrets! {
    ContainerAppId => ContainerApp,
    JobId => Job,
    DaprComponentId => DaprComponent,
}

struct Countdown {
    remaining: usize,
}

#[async_trait]
impl Poller for Countdown {
    async fn poll(&mut self) -> Result<PollStatus, RemoteError> {
        if self.remaining == 0 {
            return Ok(PollStatus::Succeeded);
        }
        self.remaining -= 1;
        trace!(remaining = self.remaining, "Operation still running");
        Ok(PollStatus::InProgress)
    }
}

impl Hosted for ManagedEnvironment {
    type Id = ManagedEnvironmentId;

    fn admit(
        &mut self,
        id: &Self::Id,
        stored: Option<Self>,
        _state: &mut State,
    ) -> Result<(), RemoteError> {
        let location = self
            .location
            .clone()
            .filter(|location| !location.is_empty())
            .ok_or_else(|| bad_request("LocationRequired", "location is required"))?;
        let properties = self.properties.get_or_insert_with(Default::default);

        let key_missing = properties
            .app_logs_configuration
            .as_ref()
            .and_then(|logs| logs.log_analytics_configuration.as_ref())
            .is_some_and(|analytics| {
                analytics.shared_key.as_deref().unwrap_or_default().is_empty()
            });
        if key_missing {
            return Err(bad_request(
                "ManagedEnvironmentInvalidLogAnalyticsConfiguration",
                "logAnalyticsConfiguration.sharedKey is required",
            ));
        }
        properties.app_logs_configuration = match properties.app_logs_configuration.take() {
            None => stored
                .and_then(|stored| stored.properties)
                .and_then(|stored| stored.app_logs_configuration),
            Some(logs) if logs == AppLogsConfiguration::default() => None,
            Some(logs) => Some(logs),
        };

        properties.provisioning_state = Some(SUCCEEDED.to_string());
        properties.default_domain = Some(format!(
            "{}-{:08x}.{}.azurecontainerapps.io",
            id.environment_name.to_ascii_lowercase(),
            fingerprint(&key_of(id)) as u32,
            location.to_ascii_lowercase().replace(' ', "")
        ));
        properties.static_ip = Some("20.76.201.9".to_string());
        Ok(())
    }

    fn redact(&mut self) {
        let analytics = self
            .properties
            .as_mut()
            .and_then(|properties| properties.app_logs_configuration.as_mut())
            .and_then(|logs| logs.log_analytics_configuration.as_mut());
        if let Some(analytics) = analytics {
            analytics.shared_key = None;
        }
    }
}

impl Hosted for ContainerApp {
    type Id = ContainerAppId;

    fn admit(
        &mut self,
        id: &Self::Id,
        stored: Option<Self>,
        state: &mut State,
    ) -> Result<(), RemoteError> {
        let name = &id.container_app_name;
        let properties = self.properties.get_or_insert_with(Default::default);
        let environment =
            environment_of(properties.managed_environment_id.as_deref(), "managedEnvironmentId")?;
        let default_domain = default_domain(state, &environment)?;

        let configuration = properties.configuration.get_or_insert_with(Default::default);
        check_secret_values(configuration.secrets.as_deref())?;
        if let Some(ingress) = configuration.ingress.as_mut() {
            for domain in ingress.custom_domains.iter().flatten() {
                check_certificate(state, domain)?;
            }
            ingress.fqdn = Some(format!("{name}.{default_domain}"));
        }

        let stored = stored.and_then(|stored| stored.properties);
        let template = properties.template.get_or_insert_with(Default::default);
        let stored_template = stored.as_ref().and_then(|stored| stored.template.as_ref());
        let template_changed = !same_template(stored_template, template);
        let used = state.revisions.entry(key_of(id)).or_default();

        let suffix = match template.revision_suffix.as_deref().filter(|suffix| !suffix.is_empty()) {
            Some(suffix) if used.iter().any(|used| used.eq_ignore_ascii_case(suffix)) => {
                return Err(RemoteError::status(
                    409,
                    "ContainerAppRevisionSuffixConflict",
                    format!(
                        "revision with suffix {suffix:?} already exists for Container App {name:?}"
                    ),
                ));
            }
            Some(suffix) => Some(suffix.to_string()),
            None if template_changed => Some(format!("{:07x}", used.len() + 1)),
            None => None,
        };

        match suffix {
            Some(suffix) => {
                properties.latest_revision_name = Some(format!("{name}--{suffix}"));
                properties.latest_revision_fqdn =
                    Some(format!("{name}--{suffix}.{default_domain}"));
                used.push(suffix);
            }
            None => {
                let stored = stored.as_ref();
                properties.latest_revision_name =
                    stored.and_then(|stored| stored.latest_revision_name.clone());
                properties.latest_revision_fqdn =
                    stored.and_then(|stored| stored.latest_revision_fqdn.clone());
            }
        }

        properties.provisioning_state = Some(SUCCEEDED.to_string());
        properties.outbound_ip_addresses = Some(vec![OUTBOUND_IP.to_string()]);
        properties.custom_domain_verification_id =
            Some(format!("{:016X}", fingerprint(&id.subscription_id)));
        Ok(())
    }

    fn redact(&mut self) {
        let secrets = self
            .properties
            .as_mut()
            .and_then(|properties| properties.configuration.as_mut())
            .and_then(|configuration| configuration.secrets.as_mut());
        redact_secrets(secrets);
    }

    fn secrets(&self) -> Vec<Secret> {
        self.configuration()
            .and_then(|configuration| configuration.secrets.clone())
            .unwrap_or_default()
    }

    fn forget(key: &str, state: &mut State) {
        state.revisions.remove(key);
    }
}

impl Hosted for Job {
    type Id = JobId;

    fn admit(
        &mut self,
        id: &Self::Id,
        _stored: Option<Self>,
        state: &mut State,
    ) -> Result<(), RemoteError> {
        let location = self.location.clone().unwrap_or_default();
        let properties = self.properties.get_or_insert_with(Default::default);
        let environment = environment_of(properties.environment_id.as_deref(), "environmentId")?;
        state.require(&environment)?;

        let configuration = properties.configuration.get_or_insert_with(Default::default);
        check_secret_values(configuration.secrets.as_deref())?;
        if configuration.trigger_type.as_deref().unwrap_or_default().is_empty() {
            return Err(bad_request(
                "InvalidRequestContent",
                "configuration.triggerType is required",
            ));
        }

        properties.provisioning_state = Some(SUCCEEDED.to_string());
        properties.outbound_ip_addresses = Some(vec![OUTBOUND_IP.to_string()]);
        properties.event_stream_endpoint = Some(format!(
            "https://{}.azurecontainerapps.dev/subscriptions/{}/resourceGroups/{}/containerApps/{}/eventstream",
            location.to_ascii_lowercase().replace(' ', ""),
            id.subscription_id,
            id.resource_group_name,
            id.job_name
        ));
        Ok(())
    }

    fn redact(&mut self) {
        let secrets = self
            .properties
            .as_mut()
            .and_then(|properties| properties.configuration.as_mut())
            .and_then(|configuration| configuration.secrets.as_mut());
        redact_secrets(secrets);
    }

    fn secrets(&self) -> Vec<Secret> {
        self.configuration()
            .and_then(|configuration| configuration.secrets.clone())
            .unwrap_or_default()
    }
}

impl Hosted for Certificate {
    type Id = CertificateId;

    fn admit(
        &mut self,
        id: &Self::Id,
        _stored: Option<Self>,
        state: &mut State,
    ) -> Result<(), RemoteError> {
        state.require(&id.managed_environment_id())?;
        let properties = self.properties.get_or_insert_with(Default::default);
        let blob = properties.value.clone().unwrap_or_default();
        if blob.is_empty() {
            return Err(bad_request("InvalidCertificateValue", "properties.value is required"));
        }

        properties.provisioning_state = Some(SUCCEEDED.to_string());
        properties.subject_name = Some(format!("CN={}", id.certificate_name));
        properties.issuer = Some("CN=Contoso Issuing CA".to_string());
        properties.issue_date = Some("2025-01-01T00:00:00Z".to_string());
        properties.expiration_date = Some("2027-01-01T00:00:00Z".to_string());
        properties.thumbprint = Some(format!("{:016X}", fingerprint(&blob)));
        properties.valid = Some(true);
        Ok(())
    }

    fn redact(&mut self) {
        if let Some(properties) = self.properties.as_mut() {
            properties.value = None;
            properties.password = None;
        }
    }
}

impl Hosted for ManagedCertificate {
    type Id = ManagedCertificateId;

    fn admit(
        &mut self,
        id: &Self::Id,
        _stored: Option<Self>,
        state: &mut State,
    ) -> Result<(), RemoteError> {
        state.require(&id.managed_environment_id())?;
        let properties = self.properties.get_or_insert_with(Default::default);
        let subject = properties.subject_name.clone().unwrap_or_default();
        if subject.is_empty() {
            return Err(bad_request("InvalidRequestContent", "properties.subjectName is required"));
        }

        properties.provisioning_state = Some(SUCCEEDED.to_string());
        properties.validation_token = Some(format!("{:016x}", fingerprint(&subject)));
        Ok(())
    }
}

impl Hosted for DaprComponent {
    type Id = DaprComponentId;

    fn admit(
        &mut self,
        id: &Self::Id,
        _stored: Option<Self>,
        state: &mut State,
    ) -> Result<(), RemoteError> {
        state.require(&id.managed_environment_id())?;
        let properties = self.properties_mut();
        if properties.component_type.as_deref().unwrap_or_default().is_empty() {
            return Err(bad_request(
                "InvalidRequestContent",
                "properties.componentType is required",
            ));
        }
        check_secret_values(properties.secrets.as_deref())
    }

    fn redact(&mut self) {
        redact_secrets(self.properties.as_mut().and_then(|properties| properties.secrets.as_mut()));
    }

    fn secrets(&self) -> Vec<Secret> {
        self.properties
            .as_ref()
            .and_then(|properties| properties.secrets.clone())
            .unwrap_or_default()
    }
}

impl Hosted for ManagedEnvironmentStorage {
    type Id = EnvironmentStorageId;

    fn admit(
        &mut self,
        id: &Self::Id,
        _stored: Option<Self>,
        state: &mut State,
    ) -> Result<(), RemoteError> {
        state.require(&id.managed_environment_id())?;
        let key_missing = self
            .properties
            .as_ref()
            .and_then(|properties| properties.azure_file.as_ref())
            .map_or(true, |azure_file| {
                azure_file.account_key.as_deref().unwrap_or_default().is_empty()
            });
        if key_missing {
            return Err(bad_request(
                "InvalidRequestContent",
                "properties.azureFile.accountKey is required",
            ));
        }
        Ok(())
    }

    fn redact(&mut self) {
        let azure_file = self
            .properties
            .as_mut()
            .and_then(|properties| properties.azure_file.as_mut());
        if let Some(azure_file) = azure_file {
            azure_file.account_key = None;
        }
    }
}

fn key_of<I: ResourceId>(id: &I) -> String {
    id.lock_key().as_str().to_string()
}

fn bad_request(code: &str, message: impl Into<String>) -> RemoteError {
    RemoteError::status(400, code, message)
}

fn parent_missing<I: ResourceId>(parent: &I) -> RemoteError {
    RemoteError::status(
        404,
        "ParentResourceNotFound",
        format!("{} {:?} was not found", I::KIND, parent.to_string()),
    )
}

fn environment_of(raw: Option<&str>, field: &str) -> Result<ManagedEnvironmentId, RemoteError> {
    let raw = raw
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| {
            bad_request("InvalidRequestContent", format!("properties.{field} is required"))
        })?;
    ManagedEnvironmentId::parse_insensitively(raw)
        .map_err(|e| bad_request("InvalidRequestContent", e.to_string()))
}

fn default_domain(
    state: &State,
    environment: &ManagedEnvironmentId,
) -> Result<String, RemoteError> {
    let found: ManagedEnvironment = state
        .load(&key_of(environment))?
        .ok_or_else(|| parent_missing(environment))?;
    Ok(found
        .properties
        .and_then(|properties| properties.default_domain)
        .unwrap_or_default())
}

fn check_secret_values(secrets: Option<&[Secret]>) -> Result<(), RemoteError> {
    for secret in secrets.unwrap_or_default() {
        let has_value = secret.value.as_deref().is_some_and(|value| !value.is_empty());
        if !has_value && !secret.is_key_vault_reference() {
            return Err(bad_request(
                "ContainerAppSecretInvalid",
                format!(
                    "secret {:?} must have a value or a Key Vault reference",
                    secret.name.as_deref().unwrap_or_default()
                ),
            ));
        }
    }
    Ok(())
}

fn check_certificate(state: &State, domain: &CustomDomain) -> Result<(), RemoteError> {
    let Some(raw) = domain.certificate_id.as_deref().filter(|raw| !raw.is_empty()) else {
        return Ok(());
    };
    let exists = match AnyCertificateId::parse_insensitively(raw) {
        Some(AnyCertificateId::Environment(certificate)) => state.contains(&certificate),
        Some(AnyCertificateId::Managed(certificate)) => state.contains(&certificate),
        None => false,
    };
    if exists {
        Ok(())
    } else {
        Err(bad_request(
            "CertificateNotFound",
            format!("certificate {raw:?} bound to {:?} was not found", domain.name),
        ))
    }
}

fn redact_secrets(secrets: Option<&mut Vec<Secret>>) {
    for secret in secrets.into_iter().flatten() {
        secret.value = None;
    }
}

/// Whether two templates describe the same revision. The suffix only names it.
fn same_template(stored: Option<&Template>, proposed: &Template) -> bool {
    let unnamed = |template: &Template| Template {
        revision_suffix: None,
        ..template.clone()
    };
    stored.map(unnamed) == Some(unnamed(proposed))
}

fn fingerprint(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
