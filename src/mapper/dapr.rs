//! The Dapr sidecar of a Container App.

use super::{non_empty, non_zero};
use crate::wire::Dapr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaprModel {
    pub app_id: String,
    pub app_port: i64,
    /// `http` or `grpc`.
    pub app_protocol: String,
}

/// A block without an app id switches the sidecar off.
pub fn expand_dapr(input: Option<&DaprModel>) -> Option<Dapr> {
    let dapr = input?;
    if dapr.app_id.is_empty() {
        return Some(Dapr {
            enabled: Some(false),
            ..Default::default()
        });
    }

    Some(Dapr {
        enabled: Some(true),
        app_id: Some(dapr.app_id.clone()),
        app_protocol: non_empty(&dapr.app_protocol),
        app_port: non_zero(dapr.app_port),
        ..Default::default()
    })
}

pub fn flatten_dapr(input: Option<Dapr>) -> Option<DaprModel> {
    let dapr = input.filter(|dapr| dapr.enabled != Some(false))?;
    Some(DaprModel {
        app_id: dapr.app_id.unwrap_or_default(),
        app_port: dapr.app_port.unwrap_or_default(),
        app_protocol: dapr.app_protocol.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let dapr = DaprModel {
            app_id: "orders".into(),
            app_port: 3000,
            app_protocol: "grpc".into(),
        };
        assert_eq!(flatten_dapr(expand_dapr(Some(&dapr))), Some(dapr));
    }

    #[test]
    fn missing_app_id_disables_the_sidecar() {
        let expanded = expand_dapr(Some(&DaprModel::default())).unwrap();
        assert_eq!(expanded.enabled, Some(false));
        assert_eq!(expanded.app_id, None);
        assert_eq!(flatten_dapr(Some(expanded)), None);
    }
}
