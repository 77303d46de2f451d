//! Kubernetes representations of gateway configuration.
//!
//! Every resource kind except files is a namespaced custom resource in the `gloo.solo.io/v1`
//! API group. Their specs are deliberately schemaless: the stored spec is the resource's JSON
//! form minus its name, metadata and status, and the CRD preserves unknown fields so the
//! API server stores it untouched. Files are stored as labeled ConfigMaps.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
pub mod file;
mod status;

#[cfg(test)]
mod tests;

pub use self::{
    config::{
        Attribute, AttributeSpec, ConfigObject, Role, RoleSpec, Upstream, UpstreamSpec,
        VirtualMesh, VirtualMeshSpec, VirtualService, VirtualServiceSpec,
    },
    status::ResourceStatus,
};
pub use k8s_openapi::{
    api::core::v1::{ConfigMap, Namespace},
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
pub use kube::{core::ObjectMeta, CustomResourceExt, ResourceExt};

pub const GROUP: &str = "gloo.solo.io";
pub const VERSION: &str = "v1";

/// Returns the definitions of every custom resource the storage layer uses.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        Upstream::crd(),
        VirtualService::crd(),
        Role::crd(),
        Attribute::crd(),
        VirtualMesh::crd(),
    ]
}
