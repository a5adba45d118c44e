use super::Unmodelled;
use serde::{Deserialize, Serialize};

/// An Azure Files share mounted into an environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedEnvironmentStorage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<StorageProperties>,
    #[serde(flatten)]
    pub extra: Unmodelled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_file: Option<AzureFileProperties>,
    #[serde(flatten)]
    pub extra: Unmodelled,
}

/// `account_key` is write-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureFileProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    #[serde(flatten)]
    pub extra: Unmodelled,
}
