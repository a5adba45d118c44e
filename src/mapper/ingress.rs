//! Ingress of a Container App.
//!
//! Traffic weights address revisions by their full name (`{app}--{suffix}`) on the wire but
//! by suffix locally. Custom domains are managed through their own resource, so the
//! app only ever reports them.

use super::{non_empty, non_empty_vec, non_zero};
use crate::wire::{CustomDomain, Ingress, TrafficWeight};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressModel {
    pub allow_insecure_connections: bool,
    pub external_enabled: bool,
    pub target_port: i64,
    pub exposed_port: i64,
    /// `auto`, `http`, `http2` or `tcp`.
    pub transport: String,
    pub traffic_weights: Vec<TrafficWeightModel>,
    /// Computed.
    pub fqdn: String,
    /// Computed; bound through the custom domain resource.
    pub custom_domains: Vec<CustomDomainModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficWeightModel {
    pub label: String,
    pub latest_revision: bool,
    pub revision_suffix: String,
    pub percentage: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomDomainModel {
    pub name: String,
    pub certificate_binding_type: String,
    pub certificate_id: String,
}

/// Computed fields and custom domains are never sent.
pub fn expand_ingress(input: Option<&IngressModel>, app_name: &str) -> Option<Ingress> {
    let ingress = input?;
    Some(Ingress {
        fqdn: None,
        external: Some(ingress.external_enabled),
        target_port: Some(ingress.target_port),
        exposed_port: non_zero(ingress.exposed_port),
        transport: non_empty(&ingress.transport),
        allow_insecure: Some(ingress.allow_insecure_connections),
        traffic: expand_traffic(&ingress.traffic_weights, app_name),
        custom_domains: None,
        ..Default::default()
    })
}

/// Transport is reported in lower case.
pub fn flatten_ingress(input: Option<Ingress>, app_name: &str) -> Option<IngressModel> {
    let ingress = input?;
    Some(IngressModel {
        allow_insecure_connections: ingress.allow_insecure.unwrap_or_default(),
        external_enabled: ingress.external.unwrap_or_default(),
        target_port: ingress.target_port.unwrap_or_default(),
        exposed_port: ingress.exposed_port.unwrap_or_default(),
        transport: ingress
            .transport
            .map(|transport| transport.to_lowercase())
            .unwrap_or_default(),
        traffic_weights: flatten_traffic(ingress.traffic, app_name),
        fqdn: ingress.fqdn.unwrap_or_default(),
        custom_domains: flatten_custom_domains(ingress.custom_domains),
    })
}

fn expand_traffic(input: &[TrafficWeightModel], app_name: &str) -> Option<Vec<TrafficWeight>> {
    non_empty_vec(
        input
            .iter()
            .map(|weight| TrafficWeight {
                revision_name: (!weight.latest_revision)
                    .then(|| format!("{app_name}--{}", weight.revision_suffix)),
                weight: Some(weight.percentage),
                latest_revision: Some(weight.latest_revision),
                label: non_empty(&weight.label),
            })
            .collect(),
    )
}

fn flatten_traffic(input: Option<Vec<TrafficWeight>>, app_name: &str) -> Vec<TrafficWeightModel> {
    let prefix = format!("{app_name}--");
    input
        .unwrap_or_default()
        .into_iter()
        .map(|weight| {
            let revision_name = weight.revision_name.unwrap_or_default();
            TrafficWeightModel {
                label: weight.label.unwrap_or_default(),
                latest_revision: weight.latest_revision.unwrap_or_default(),
                revision_suffix: revision_name
                    .strip_prefix(&prefix)
                    .unwrap_or(&revision_name)
                    .to_string(),
                percentage: weight.weight.unwrap_or_default(),
            }
        })
        .collect()
}

fn flatten_custom_domains(input: Option<Vec<CustomDomain>>) -> Vec<CustomDomainModel> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|domain| CustomDomainModel {
            name: domain.name,
            certificate_binding_type: domain.binding_type.unwrap_or_default(),
            certificate_id: domain.certificate_id.unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingress() -> IngressModel {
        IngressModel {
            external_enabled: true,
            target_port: 8080,
            transport: "http".into(),
            traffic_weights: vec![
                TrafficWeightModel {
                    latest_revision: true,
                    percentage: 80,
                    ..Default::default()
                },
                TrafficWeightModel {
                    label: "canary".into(),
                    revision_suffix: "blue".into(),
                    percentage: 20,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn round_trips() {
        let expanded = expand_ingress(Some(&ingress()), "foo");
        assert_eq!(flatten_ingress(expanded, "foo"), Some(ingress()));
    }

    #[test]
    fn pinned_revisions_are_addressed_by_full_name() {
        let expanded = expand_ingress(Some(&ingress()), "foo").unwrap();
        let traffic = expanded.traffic.unwrap();
        assert_eq!(traffic[0].revision_name, None);
        assert_eq!(traffic[1].revision_name.as_deref(), Some("foo--blue"));
    }

    #[test]
    fn transport_is_normalised_to_lower_case() {
        let wire = Ingress {
            transport: Some("Http2".into()),
            ..Default::default()
        };
        assert_eq!(flatten_ingress(Some(wire), "foo").unwrap().transport, "http2");
    }

    #[test]
    fn custom_domains_are_reported_but_never_sent() {
        let wire = Ingress {
            custom_domains: Some(vec![CustomDomain {
                name: "a.example.com".into(),
                binding_type: Some("SniEnabled".into()),
                certificate_id: None,
            }]),
            ..Default::default()
        };
        let flattened = flatten_ingress(Some(wire), "foo").unwrap();
        assert_eq!(flattened.custom_domains[0].name, "a.example.com");
        assert_eq!(expand_ingress(Some(&flattened), "foo").unwrap().custom_domains, None);
    }

    #[test]
    fn absent_ingress_stays_absent() {
        assert_eq!(expand_ingress(None, "foo"), None);
        assert_eq!(flatten_ingress(None, "foo"), None);
    }
}
