//! Identifiers of the `Microsoft.App` resource family.
//!
//! Every identifier starts with the subscription and resource group, followed by the
//! `providers/Microsoft.App` namespace and one or two `{type}/{name}` pairs:
//!
//! ```text
//! /subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.App/containerApps/{name}
//! /subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.App/managedEnvironments/{env}/certificates/{name}
//! ```

use reconcile_framework::id::{IdPattern, ResourceId, Segment};
use std::fmt;

macro_rules! app_resource_id {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal, { $( $segment:literal => $field:ident ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub subscription_id: String,
            pub resource_group_name: String,
            $( pub $field: String, )+
        }

        impl $name {
            pub fn new(
                subscription_id: impl Into<String>,
                resource_group_name: impl Into<String>,
                $( $field: impl Into<String>, )+
            ) -> Self {
                Self {
                    subscription_id: subscription_id.into(),
                    resource_group_name: resource_group_name.into(),
                    $( $field: $field.into(), )+
                }
            }
        }

        impl ResourceId for $name {
            const KIND: &'static str = $kind;
            const PATTERN: IdPattern = IdPattern::new(&[
                Segment::Static("subscriptions"),
                Segment::Value("subscriptionId"),
                Segment::Static("resourceGroups"),
                Segment::Value("resourceGroupName"),
                Segment::Static("providers"),
                Segment::Static("Microsoft.App"),
                $( Segment::Static($segment), Segment::Value(stringify!($field)), )+
            ]);

            fn from_values(values: Vec<String>) -> Self {
                let mut values = values.into_iter();
                Self {
                    subscription_id: values.next().unwrap_or_default(),
                    resource_group_name: values.next().unwrap_or_default(),
                    $( $field: values.next().unwrap_or_default(), )+
                }
            }

            fn values(&self) -> Vec<&str> {
                vec![
                    self.subscription_id.as_str(),
                    self.resource_group_name.as_str(),
                    $( self.$field.as_str(), )+
                ]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.format_id())
            }
        }
    };
}

app_resource_id!(ManagedEnvironmentId, "Managed Environment", {
    "managedEnvironments" => environment_name,
});

app_resource_id!(ContainerAppId, "Container App", {
    "containerApps" => container_app_name,
});

app_resource_id!(JobId, "Container App Job", {
    "jobs" => job_name,
});

app_resource_id!(
    /// A certificate uploaded to an environment.
    CertificateId, "Container App Environment Certificate", {
        "managedEnvironments" => environment_name,
        "certificates" => certificate_name,
    }
);

app_resource_id!(
    /// A certificate the platform issues and renews for a hostname.
    ManagedCertificateId, "Container App Environment Managed Certificate", {
        "managedEnvironments" => environment_name,
        "managedCertificates" => managed_certificate_name,
    }
);

app_resource_id!(DaprComponentId, "Container App Environment Dapr Component", {
    "managedEnvironments" => environment_name,
    "daprComponents" => dapr_component_name,
});

app_resource_id!(EnvironmentStorageId, "Container App Environment Storage", {
    "managedEnvironments" => environment_name,
    "storages" => storage_name,
});

app_resource_id!(
    /// A hostname bound to an app. It has no endpoint of its own; it is an entry in
    /// the app's ingress configuration.
    CustomDomainId, "Container App Custom Domain", {
        "containerApps" => container_app_name,
        "customDomainName" => custom_domain_name,
    }
);

impl ContainerAppId {
    /// An app in the same resource group as `environment`.
    pub fn in_group_of(environment: &ManagedEnvironmentId, name: impl Into<String>) -> Self {
        Self::new(
            environment.subscription_id.clone(),
            environment.resource_group_name.clone(),
            name,
        )
    }

    pub fn custom_domain(&self, hostname: impl Into<String>) -> CustomDomainId {
        CustomDomainId::new(
            self.subscription_id.clone(),
            self.resource_group_name.clone(),
            self.container_app_name.clone(),
            hostname,
        )
    }
}

impl CustomDomainId {
    pub fn container_app_id(&self) -> ContainerAppId {
        ContainerAppId::new(
            self.subscription_id.clone(),
            self.resource_group_name.clone(),
            self.container_app_name.clone(),
        )
    }
}

macro_rules! environment_child {
    ($($child:ident),+) => {
        $(
            impl $child {
                pub fn managed_environment_id(&self) -> ManagedEnvironmentId {
                    ManagedEnvironmentId::new(
                        self.subscription_id.clone(),
                        self.resource_group_name.clone(),
                        self.environment_name.clone(),
                    )
                }
            }
        )+
    };
}

environment_child!(CertificateId, ManagedCertificateId, DaprComponentId, EnvironmentStorageId);

/// A certificate reference as echoed by the API: either kind, in whatever casing the
/// service chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyCertificateId {
    Environment(CertificateId),
    Managed(ManagedCertificateId),
}

impl AnyCertificateId {
    pub fn parse_insensitively(input: &str) -> Option<Self> {
        if let Ok(id) = ManagedCertificateId::parse_insensitively(input) {
            return Some(Self::Managed(id));
        }
        CertificateId::parse_insensitively(input).ok().map(Self::Environment)
    }
}

impl fmt::Display for AnyCertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment(id) => id.fmt(f),
            Self::Managed(id) => id.fmt(f),
        }
    }
}
