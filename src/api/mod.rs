//! # Remote Accessors
//!
//! Each resource kind declares the remote calls it needs as one trait. The traits are
//! pure unions of [`RemoteApi`] and [`SecretLister`] pairs with blanket impls, so any
//! accessor that serves the pairs serves the kind:
//!
//! - [`arm::ArmClient`] talks to Azure Resource Manager over HTTPS.
//! - [`memory::InMemoryControlPlane`] simulates the service for tests and the demo.
//!
//! [`ControlPlane`] is everything at once, which is what the provider is built from.

pub mod arm;
pub mod memory;

use crate::ids::{
    CertificateId, ContainerAppId, DaprComponentId, EnvironmentStorageId, JobId,
    ManagedCertificateId, ManagedEnvironmentId,
};
use crate::wire::{
    Certificate, ContainerApp, DaprComponent, Job, ManagedCertificate, ManagedEnvironment,
    ManagedEnvironmentStorage, Secret,
};
use reconcile_framework::{RemoteApi, SecretLister};

pub use arm::{ArmClient, ArmConfig, StaticToken, TokenSource};
pub use memory::InMemoryControlPlane;

pub trait EnvironmentsApi: RemoteApi<ManagedEnvironmentId, ManagedEnvironment> {}

impl<T> EnvironmentsApi for T where
    T: ?Sized + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>
{
}

/// Apps read their environment on create to inherit its location.
pub trait ContainerAppsApi:
    RemoteApi<ContainerAppId, ContainerApp>
    + SecretLister<ContainerAppId, Secret>
    + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>
{
}

impl<T> ContainerAppsApi for T where
    T: ?Sized
        + RemoteApi<ContainerAppId, ContainerApp>
        + SecretLister<ContainerAppId, Secret>
        + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>
{
}

pub trait JobsApi: RemoteApi<JobId, Job> + SecretLister<JobId, Secret> {}

impl<T> JobsApi for T where T: ?Sized + RemoteApi<JobId, Job> + SecretLister<JobId, Secret> {}

/// Certificates read their environment on create to inherit its location.
pub trait CertificatesApi:
    RemoteApi<CertificateId, Certificate> + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>
{
}

impl<T> CertificatesApi for T where
    T: ?Sized
        + RemoteApi<CertificateId, Certificate>
        + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>
{
}

pub trait ManagedCertificatesApi:
    RemoteApi<ManagedCertificateId, ManagedCertificate>
    + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>
{
}

impl<T> ManagedCertificatesApi for T where
    T: ?Sized
        + RemoteApi<ManagedCertificateId, ManagedCertificate>
        + RemoteApi<ManagedEnvironmentId, ManagedEnvironment>
{
}

pub trait DaprComponentsApi:
    RemoteApi<DaprComponentId, DaprComponent> + SecretLister<DaprComponentId, Secret>
{
}

impl<T> DaprComponentsApi for T where
    T: ?Sized + RemoteApi<DaprComponentId, DaprComponent> + SecretLister<DaprComponentId, Secret>
{
}

pub trait StoragesApi: RemoteApi<EnvironmentStorageId, ManagedEnvironmentStorage> {}

impl<T> StoragesApi for T where
    T: ?Sized + RemoteApi<EnvironmentStorageId, ManagedEnvironmentStorage>
{
}

/// Every accessor the provider wires up.
pub trait ControlPlane:
    EnvironmentsApi
    + ContainerAppsApi
    + JobsApi
    + CertificatesApi
    + ManagedCertificatesApi
    + DaprComponentsApi
    + StoragesApi
{
}

impl<T> ControlPlane for T where
    T: ?Sized
        + EnvironmentsApi
        + ContainerAppsApi
        + JobsApi
        + CertificatesApi
        + ManagedCertificatesApi
        + DaprComponentsApi
        + StoragesApi
{
}
