//! Secrets on apps, jobs and Dapr components.

use super::non_empty;
use crate::wire::Secret;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretModel {
    pub name: String,
    /// Empty for Key Vault references.
    pub value: String,
    pub identity: String,
    pub key_vault_secret_id: String,
}

impl SecretModel {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// An empty list expands to an absent one.
pub fn expand_secrets(input: &[SecretModel]) -> Option<Vec<Secret>> {
    if input.is_empty() {
        return None;
    }

    Some(
        input
            .iter()
            .map(|secret| {
                let key_vault_url = non_empty(&secret.key_vault_secret_id);
                Secret {
                    name: Some(secret.name.clone()),
                    value: key_vault_url.is_none().then(|| secret.value.clone()),
                    identity: non_empty(&secret.identity),
                    key_vault_url,
                }
            })
            .collect(),
    )
}

/// `value` is only taken for secrets that are not Key Vault references.
pub fn flatten_secrets(input: Option<Vec<Secret>>) -> Vec<SecretModel> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|secret| {
            let value = if secret.is_key_vault_reference() {
                String::new()
            } else {
                secret.value.unwrap_or_default()
            };
            SecretModel {
                name: secret.name.unwrap_or_default(),
                value,
                identity: secret.identity.unwrap_or_default(),
                key_vault_secret_id: secret.key_vault_url.unwrap_or_default(),
            }
        })
        .collect()
}

pub fn secret_names(input: &[SecretModel]) -> impl Iterator<Item = &str> {
    input.iter().map(|secret| secret.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_absent_on_the_wire() {
        assert_eq!(expand_secrets(&[]), None);
        assert!(flatten_secrets(None).is_empty());
    }

    #[test]
    fn round_trips() {
        let secrets = vec![
            SecretModel::new("rick", "morty"),
            SecretModel {
                name: "db".into(),
                identity: "System".into(),
                key_vault_secret_id: "https://kv.vault.azure.net/secrets/db".into(),
                ..Default::default()
            },
        ];
        assert_eq!(flatten_secrets(expand_secrets(&secrets)), secrets);
    }

    #[test]
    fn key_vault_references_send_no_value() {
        let expanded = expand_secrets(&[SecretModel {
            name: "db".into(),
            value: "ignored".into(),
            key_vault_secret_id: "https://kv.vault.azure.net/secrets/db".into(),
            ..Default::default()
        }])
        .unwrap();
        assert_eq!(expanded[0].value, None);
    }

    #[test]
    fn redacted_values_flatten_to_empty() {
        let flattened = flatten_secrets(Some(vec![Secret {
            name: Some("rick".into()),
            ..Default::default()
        }]));
        assert_eq!(flattened, vec![SecretModel::new("rick", "")]);
    }
}
