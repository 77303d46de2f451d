//! Kubernetes storage backend
//!
//! Resources are namespaced custom resources in the `gloo.solo.io/v1` API group; files are
//! labeled ConfigMaps. Resource versions are the API server's `resourceVersion`s, and updates are
//! replaces that present the caller's version, so the API server enforces optimistic concurrency.
//!
//! Watches are list-then-watch streams from [`kube::runtime::watcher`] that relist after errors.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod resource;
mod watch;

#[cfg(test)]
mod tests;

pub use self::{
    client::KubeClient,
    resource::{validate_object_name, KubeResource},
};
use client::status_code;
use gateway_storage_core::{
    Attribute, Error, File, ResourceClient, Result, Role, Storage, Upstream, VirtualMesh,
    VirtualService,
};
use gateway_storage_k8s_api::{self as api, CustomResourceDefinition, Namespace, ObjectMeta};
use kube::{
    api::{Api, PostParams},
    runtime::wait::{await_condition, conditions},
};
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

/// How long `register` waits for a newly created CRD to be served.
const CRD_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_NAMESPACE: &str = "gloo-system";

#[derive(Clone)]
pub struct KubeStorage {
    client: kube::Client,
    namespace: String,
    upstreams: KubeClient<Upstream>,
    virtual_services: KubeClient<VirtualService>,
    roles: KubeClient<Role>,
    attributes: KubeClient<Attribute>,
    virtual_meshes: KubeClient<VirtualMesh>,
    files: KubeClient<File>,
}

// === impl KubeStorage ===

impl KubeStorage {
    /// `sync_interval` bounds how long a watch request stays open before it is renewed.
    pub fn new(client: kube::Client, namespace: impl Into<String>, sync_interval: Duration) -> Self {
        let namespace = namespace.into();
        Self {
            upstreams: KubeClient::new(client.clone(), &namespace, sync_interval),
            virtual_services: KubeClient::new(client.clone(), &namespace, sync_interval),
            roles: KubeClient::new(client.clone(), &namespace, sync_interval),
            attributes: KubeClient::new(client.clone(), &namespace, sync_interval),
            virtual_meshes: KubeClient::new(client.clone(), &namespace, sync_interval),
            files: KubeClient::new(client.clone(), &namespace, sync_interval),
            client,
            namespace,
        }
    }

    async fn create_namespace(&self) -> Result<()> {
        let api = Api::<Namespace>::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(self.namespace.clone()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => info!(namespace = %self.namespace, "Created namespace"),
            Err(error) if status_code(&error) == Some(409) => {
                debug!(namespace = %self.namespace, "Namespace already exists")
            }
            Err(error) => {
                return Err(Error::backend(
                    format!("failed to create namespace {}", self.namespace),
                    error,
                ))
            }
        }
        Ok(())
    }

    async fn create_crd(&self, crd: CustomResourceDefinition) -> Result<()> {
        let api = Api::<CustomResourceDefinition>::all(self.client.clone());
        let name = crd.metadata.name.clone().unwrap_or_default();
        match api.create(&PostParams::default(), &crd).await {
            Ok(_) => info!(crd = %name, "Created CustomResourceDefinition"),
            Err(error) if status_code(&error) == Some(409) => {
                debug!(crd = %name, "CustomResourceDefinition already exists");
                return Ok(());
            }
            Err(error) => {
                return Err(Error::backend(format!("failed to create CRD {name}"), error))
            }
        }

        let established = await_condition(api, &name, conditions::is_crd_established());
        match time::timeout(CRD_ESTABLISH_TIMEOUT, established).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(error)) => Err(Error::backend(format!("failed to await CRD {name}"), error)),
            Err(_) => Err(Error::backend(
                format!("failed to await CRD {name}"),
                format!("not established after {CRD_ESTABLISH_TIMEOUT:?}"),
            )),
        }
    }
}

#[async_trait::async_trait]
impl Storage for KubeStorage {
    /// Creates the storage namespace and every custom resource definition, leaving existing
    /// ones untouched.
    async fn register(&self) -> Result<()> {
        self.create_namespace().await?;
        for crd in api::crds() {
            self.create_crd(crd).await?;
        }
        Ok(())
    }

    fn upstreams(&self) -> &dyn ResourceClient<Upstream> {
        &self.upstreams
    }

    fn virtual_services(&self) -> &dyn ResourceClient<VirtualService> {
        &self.virtual_services
    }

    fn roles(&self) -> &dyn ResourceClient<Role> {
        &self.roles
    }

    fn attributes(&self) -> &dyn ResourceClient<Attribute> {
        &self.attributes
    }

    fn virtual_meshes(&self) -> &dyn ResourceClient<VirtualMesh> {
        &self.virtual_meshes
    }

    fn files(&self) -> &dyn ResourceClient<File> {
        &self.files
    }
}
