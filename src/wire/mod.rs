//! # Wire Models
//!
//! The JSON shapes the `Microsoft.App` control plane sends and accepts.
//!
//! Nearly every field is optional. A response may leave out any nested block, and the
//! State Mappers treat an absent block as "not configured". On requests, `None` fields are
//! left out of the body entirely.
//!
//! Object blocks keep the members they do not model in `extra`, so a fetched object
//! written back in full still carries health checks, identities and the like.

pub mod certificate;
pub mod container_app;
pub mod dapr;
pub mod environment;
pub mod job;
pub mod storage;

pub use certificate::*;
pub use container_app::*;
pub use dapr::*;
pub use environment::*;
pub use job::*;
pub use storage::*;

use reconcile_framework::DynamicValue;
use serde::{Deserialize, Serialize};

/// Resource tags, kept in the order they were declared.
pub type Tags = indexmap::IndexMap<String, String>;

/// Open-typed scale rule metadata.
pub type Metadata = indexmap::IndexMap<String, DynamicValue>;

/// Members of an object block this crate does not model.
pub type Unmodelled = serde_json::Map<String, serde_json::Value>;

/// Copy the members of a fetched block that a rebuilt block does not set itself.
pub fn carry_unmodelled(rebuilt: &mut Unmodelled, fetched: Unmodelled) {
    for (key, value) in fetched {
        rebuilt.entry(key).or_insert(value);
    }
}

/// A secret on an app, job or Dapr component. The value is never returned by GET.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_vault_url: Option<String>,
}

impl Secret {
    /// A Key Vault reference carries no value of its own.
    pub fn is_key_vault_reference(&self) -> bool {
        self.key_vault_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Response body of the `listSecrets` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsCollection {
    #[serde(default)]
    pub value: Vec<Secret>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvironmentVar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ContainerResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,
    #[serde(flatten)]
    pub extra: Unmodelled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVar {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRuleAuth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_parameter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_left_out_of_requests() {
        let secret = Secret {
            name: Some("rick".into()),
            value: Some("morty".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&secret).unwrap(),
            serde_json::json!({"name": "rick", "value": "morty"})
        );
    }

    #[test]
    fn partially_populated_responses_decode() {
        let container: Container =
            serde_json::from_str(r#"{"name":"web","resources":{}}"#).unwrap();
        assert_eq!(container.name.as_deref(), Some("web"));
        assert_eq!(container.resources, Some(ContainerResources::default()));
        assert!(container.env.is_none());
    }

    #[test]
    fn unmodelled_members_survive_a_fetch_and_write_back() {
        let fetched = serde_json::json!({
            "location": "westeurope",
            "identity": {"type": "SystemAssigned"},
            "properties": {
                "configuration": {"activeRevisionsMode": "Single", "maxInactiveRevisions": 10},
                "template": {
                    "initContainers": [{"name": "migrate", "image": "tools"}],
                    "containers": [{"name": "web", "image": "x", "probes": [{"type": "Liveness"}]}]
                }
            }
        });
        let app: ContainerApp = serde_json::from_value(fetched.clone()).unwrap();
        assert_eq!(app.extra["identity"], serde_json::json!({"type": "SystemAssigned"}));
        assert_eq!(serde_json::to_value(&app).unwrap(), fetched);
    }

    #[test]
    fn rebuilt_blocks_win_over_fetched_members() {
        let mut rebuilt = Unmodelled::new();
        rebuilt.insert("image".into(), "new".into());
        let mut fetched = Unmodelled::new();
        fetched.insert("image".into(), "old".into());
        fetched.insert("probes".into(), serde_json::json!([]));

        carry_unmodelled(&mut rebuilt, fetched);
        assert_eq!(rebuilt["image"], "new");
        assert_eq!(rebuilt["probes"], serde_json::json!([]));
    }

    #[test]
    fn key_vault_references_are_recognised() {
        let body = r#"{"name":"db","keyVaultUrl":"https://kv.vault.azure.net/secrets/db"}"#;
        let secret: Secret = serde_json::from_str(body).unwrap();
        assert!(secret.is_key_vault_reference());
        assert!(!Secret::default().is_key_vault_reference());
    }
}
