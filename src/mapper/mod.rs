//! # State Mappers
//!
//! Expand (local model to wire model) and flatten (wire model to local model) pairs for
//! the sub-models shared by several resource kinds.
//!
//! Every pair here is total:
//!
//! - an absent wire block flattens to an empty or zero local value, never an error;
//! - expand only fails for desired state the service would reject anyway, and says why.
//!
//! Together they round-trip: `flatten(expand(x)) == x` for every field the API persists,
//! modulo the normalizations noted on each function (transport casing, computed fields).

pub mod dapr;
pub mod ingress;
pub mod registry;
pub mod scale;
pub mod secret;
pub mod template;

pub use dapr::DaprModel;
pub use ingress::{CustomDomainModel, IngressModel, TrafficWeightModel};
pub use registry::RegistryModel;
pub use scale::{
    AzureQueueScaleRuleModel, CustomScaleRuleModel, JobScaleRuleModel, RequestScaleRuleModel,
    ScaleRuleAuthModel,
};
pub use secret::SecretModel;
pub use template::{ContainerModel, EnvVarModel, TemplateModel, VolumeModel, VolumeMountModel};

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn non_zero(value: i64) -> Option<i64> {
    (value != 0).then_some(value)
}

pub(crate) fn non_empty_vec<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}
