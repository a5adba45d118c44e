//! Container registry credentials. Passwords are referenced by secret name, never inline.

use super::non_empty;
use crate::wire::RegistryCredentials;
use reconcile_framework::MappingError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryModel {
    pub server: String,
    pub username: String,
    pub password_secret_name: String,
    pub identity: String,
}

pub fn validate_registry(registry: &RegistryModel) -> Result<(), MappingError> {
    let has_identity = !registry.identity.is_empty();
    let has_username = !registry.username.is_empty();
    let has_password = !registry.password_secret_name.is_empty();

    if has_identity && (has_username || has_password) {
        return Err(MappingError::new(
            "identity and username/password_secret_name are mutually exclusive",
        ));
    }
    if !has_identity && !has_username && !has_password {
        return Err(MappingError::new(
            "must supply either identity or username/password_secret_name",
        ));
    }
    if has_username != has_password {
        return Err(MappingError::new(
            "must supply both username and password_secret_name",
        ));
    }
    Ok(())
}

pub fn expand_registries(
    input: &[RegistryModel],
) -> Result<Option<Vec<RegistryCredentials>>, MappingError> {
    if input.is_empty() {
        return Ok(None);
    }

    input
        .iter()
        .map(|registry| {
            validate_registry(registry).map_err(|e| {
                MappingError::new(format!("invalid registry {:?}: {e}", registry.server))
            })?;
            Ok(RegistryCredentials {
                server: Some(registry.server.clone()),
                username: non_empty(&registry.username),
                password_secret_ref: non_empty(&registry.password_secret_name),
                identity: non_empty(&registry.identity),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub fn flatten_registries(input: Option<Vec<RegistryCredentials>>) -> Vec<RegistryModel> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|registry| RegistryModel {
            server: registry.server.unwrap_or_default(),
            username: registry.username.unwrap_or_default(),
            password_secret_name: registry.password_secret_ref.unwrap_or_default(),
            identity: registry.identity.unwrap_or_default(),
        })
        .collect()
}
