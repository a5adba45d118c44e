//! Scale rules of apps and event-driven jobs.
//!
//! Rule metadata is open-typed on the wire; locally every value is kept as text.

use super::{non_empty, non_empty_vec};
use crate::mapper::TemplateModel;
use crate::wire::{
    CustomScaleRule, JobScaleRule, Metadata, MetadataScaleRule, QueueScaleRule, ScaleRule,
    ScaleRuleAuth,
};
use indexmap::IndexMap;
use reconcile_framework::DynamicValue;
use serde::{Deserialize, Serialize};

const CONCURRENT_REQUESTS: &str = "concurrentRequests";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleRuleAuthModel {
    pub secret_name: String,
    pub trigger_parameter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureQueueScaleRuleModel {
    pub name: String,
    pub queue_name: String,
    pub queue_length: i64,
    pub authentications: Vec<ScaleRuleAuthModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomScaleRuleModel {
    pub name: String,
    pub custom_rule_type: String,
    pub metadata: IndexMap<String, String>,
    pub authentications: Vec<ScaleRuleAuthModel>,
}

/// HTTP and TCP rules, both keyed on concurrent requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestScaleRuleModel {
    pub name: String,
    pub concurrent_requests: String,
    pub authentications: Vec<ScaleRuleAuthModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobScaleRuleModel {
    pub name: String,
    pub custom_rule_type: String,
    pub metadata: IndexMap<String, String>,
    pub authentications: Vec<ScaleRuleAuthModel>,
}

pub fn expand_scale_rules(template: &TemplateModel) -> Option<Vec<ScaleRule>> {
    let queues = template.azure_queue_scale_rules.iter().map(|rule| ScaleRule {
        name: Some(rule.name.clone()),
        azure_queue: Some(QueueScaleRule {
            queue_name: Some(rule.queue_name.clone()),
            queue_length: Some(rule.queue_length),
            auth: expand_auth(&rule.authentications),
        }),
        ..Default::default()
    });
    let custom = template.custom_scale_rules.iter().map(|rule| ScaleRule {
        name: Some(rule.name.clone()),
        custom: Some(CustomScaleRule {
            rule_type: Some(rule.custom_rule_type.clone()),
            metadata: Some(expand_metadata(&rule.metadata)),
            auth: expand_auth(&rule.authentications),
        }),
        ..Default::default()
    });
    let http = template.http_scale_rules.iter().map(|rule| ScaleRule {
        name: Some(rule.name.clone()),
        http: Some(expand_request_rule(rule)),
        ..Default::default()
    });
    let tcp = template.tcp_scale_rules.iter().map(|rule| ScaleRule {
        name: Some(rule.name.clone()),
        tcp: Some(expand_request_rule(rule)),
        ..Default::default()
    });

    non_empty_vec(queues.chain(custom).chain(http).chain(tcp).collect())
}

/// Sorts each wire rule into the local list for its kind.
pub fn flatten_scale_rules(input: Option<Vec<ScaleRule>>, template: &mut TemplateModel) {
    for rule in input.unwrap_or_default() {
        let name = rule.name.unwrap_or_default();
        if let Some(queue) = rule.azure_queue {
            template.azure_queue_scale_rules.push(AzureQueueScaleRuleModel {
                name,
                queue_name: queue.queue_name.unwrap_or_default(),
                queue_length: queue.queue_length.unwrap_or_default(),
                authentications: flatten_auth(queue.auth),
            });
        } else if let Some(custom) = rule.custom {
            template.custom_scale_rules.push(CustomScaleRuleModel {
                name,
                custom_rule_type: custom.rule_type.unwrap_or_default(),
                metadata: flatten_metadata(custom.metadata),
                authentications: flatten_auth(custom.auth),
            });
        } else if let Some(http) = rule.http {
            template.http_scale_rules.push(flatten_request_rule(name, http));
        } else if let Some(tcp) = rule.tcp {
            template.tcp_scale_rules.push(flatten_request_rule(name, tcp));
        }
    }
}

pub fn expand_job_scale_rules(input: &[JobScaleRuleModel]) -> Option<Vec<JobScaleRule>> {
    non_empty_vec(
        input
            .iter()
            .map(|rule| JobScaleRule {
                name: Some(rule.name.clone()),
                rule_type: Some(rule.custom_rule_type.clone()),
                metadata: Some(expand_metadata(&rule.metadata)),
                auth: expand_auth(&rule.authentications),
            })
            .collect(),
    )
}

pub fn flatten_job_scale_rules(input: Option<Vec<JobScaleRule>>) -> Vec<JobScaleRuleModel> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|rule| JobScaleRuleModel {
            name: rule.name.unwrap_or_default(),
            custom_rule_type: rule.rule_type.unwrap_or_default(),
            metadata: flatten_metadata(rule.metadata),
            authentications: flatten_auth(rule.auth),
        })
        .collect()
}

fn expand_request_rule(rule: &RequestScaleRuleModel) -> MetadataScaleRule {
    let mut metadata = Metadata::new();
    metadata.insert(
        CONCURRENT_REQUESTS.to_string(),
        DynamicValue::from(rule.concurrent_requests.as_str()),
    );
    MetadataScaleRule {
        metadata: Some(metadata),
        auth: expand_auth(&rule.authentications),
    }
}

fn flatten_request_rule(name: String, rule: MetadataScaleRule) -> RequestScaleRuleModel {
    RequestScaleRuleModel {
        name,
        concurrent_requests: rule
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get(CONCURRENT_REQUESTS))
            .map(DynamicValue::as_text)
            .unwrap_or_default(),
        authentications: flatten_auth(rule.auth),
    }
}

fn expand_metadata(input: &IndexMap<String, String>) -> Metadata {
    input
        .iter()
        .map(|(key, value)| (key.clone(), DynamicValue::from(value.as_str())))
        .collect()
}

fn flatten_metadata(input: Option<Metadata>) -> IndexMap<String, String> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.as_text()))
        .collect()
}

fn expand_auth(input: &[ScaleRuleAuthModel]) -> Option<Vec<ScaleRuleAuth>> {
    non_empty_vec(
        input
            .iter()
            .map(|auth| ScaleRuleAuth {
                secret_ref: non_empty(&auth.secret_name),
                trigger_parameter: non_empty(&auth.trigger_parameter),
            })
            .collect(),
    )
}

fn flatten_auth(input: Option<Vec<ScaleRuleAuth>>) -> Vec<ScaleRuleAuthModel> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|auth| ScaleRuleAuthModel {
            secret_name: auth.secret_ref.unwrap_or_default(),
            trigger_parameter: auth.trigger_parameter.unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> Vec<ScaleRuleAuthModel> {
        vec![ScaleRuleAuthModel {
            secret_name: "queue-connection".into(),
            trigger_parameter: "connection".into(),
        }]
    }

    #[test]
    fn every_rule_kind_round_trips() {
        let template = TemplateModel {
            azure_queue_scale_rules: vec![AzureQueueScaleRuleModel {
                name: "queue".into(),
                queue_name: "orders".into(),
                queue_length: 10,
                authentications: auth(),
            }],
            custom_scale_rules: vec![CustomScaleRuleModel {
                name: "kafka".into(),
                custom_rule_type: "kafka".into(),
                metadata: IndexMap::from([
                    ("topic".to_string(), "events".to_string()),
                    ("lagThreshold".to_string(), "50".to_string()),
                ]),
                authentications: Vec::new(),
            }],
            http_scale_rules: vec![RequestScaleRuleModel {
                name: "http".into(),
                concurrent_requests: "100".into(),
                authentications: Vec::new(),
            }],
            tcp_scale_rules: vec![RequestScaleRuleModel {
                name: "tcp".into(),
                concurrent_requests: "20".into(),
                authentications: auth(),
            }],
            ..Default::default()
        };

        let mut flattened = TemplateModel::default();
        flatten_scale_rules(expand_scale_rules(&template), &mut flattened);
        assert_eq!(flattened, template);
    }

    #[test]
    fn numeric_metadata_from_the_service_is_kept_as_text() {
        let mut metadata = Metadata::new();
        metadata.insert(CONCURRENT_REQUESTS.to_string(), DynamicValue::from(100));
        let rules = vec![ScaleRule {
            name: Some("http".into()),
            http: Some(MetadataScaleRule {
                metadata: Some(metadata),
                auth: None,
            }),
            ..Default::default()
        }];

        let mut flattened = TemplateModel::default();
        flatten_scale_rules(Some(rules), &mut flattened);
        assert_eq!(flattened.http_scale_rules[0].concurrent_requests, "100");
    }

    #[test]
    fn job_rules_round_trip() {
        let rules = vec![JobScaleRuleModel {
            name: "servicebus".into(),
            custom_rule_type: "azure-servicebus".into(),
            metadata: IndexMap::from([("queueName".to_string(), "jobs".to_string())]),
            authentications: auth(),
        }];
        assert_eq!(flatten_job_scale_rules(expand_job_scale_rules(&rules)), rules);
    }

    #[test]
    fn no_rules_means_no_rules_block() {
        assert_eq!(expand_scale_rules(&TemplateModel::default()), None);
        assert_eq!(expand_job_scale_rules(&[]), None);
    }
}
