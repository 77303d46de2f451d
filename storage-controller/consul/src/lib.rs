//! Consul KV storage backend
//!
//! Every resource is one KV pair keyed `<root>/<plural>/<name>`. The value is the resource's
//! serialized form and the pair's `Flags` carry the resource kind's type flag, so items of
//! different kinds can be told apart when they are read from a shared prefix.
//!
//! Resource versions are Consul `ModifyIndex` values. Updates are check-and-set writes keyed on
//! the version the caller presents, which makes this backend safe under concurrent writers.
//!
//! Watches use blocking queries against the kind's prefix. Consul reports that *something* under
//! the prefix changed, not what: every change is delivered as `on_update` with the full list and
//! no item.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod kv;
mod watch;


pub use self::{client::ConsulClient, kv::KvError};
use gateway_storage_core::{
    Attribute, Error, File, Kind, ResourceClient, Result, Role, StorableItem, Storage, Upstream,
    VirtualMesh, VirtualService,
};
use kv::KvClient;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Default address of the local Consul agent.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8500";

#[derive(Clone, Debug)]
pub struct ConsulConfig {
    pub address: Url,

    /// ACL token sent with every request.
    pub token: Option<String>,

    pub datacenter: Option<String>,

    /// Key prefix under which all resources are stored.
    pub root: String,

    /// Delay before retrying a watch after a transient failure.
    pub sync_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct ConsulStorage {
    kv: KvClient,
    root: String,
    upstreams: ConsulClient<Upstream>,
    virtual_services: ConsulClient<VirtualService>,
    roles: ConsulClient<Role>,
    attributes: ConsulClient<Attribute>,
    virtual_meshes: ConsulClient<VirtualMesh>,
    files: ConsulClient<File>,
}

// === impl ConsulStorage ===

impl ConsulStorage {
    pub fn new(config: ConsulConfig) -> Result<Self> {
        let ConsulConfig {
            address,
            token,
            datacenter,
            root,
            sync_interval,
        } = config;
        let kv = KvClient::new(address, token, datacenter)
            .map_err(|error| Error::backend("failed to build consul client", error))?;
        let root = root.trim_matches('/').to_string();
        Ok(Self {
            upstreams: ConsulClient::new(kv.clone(), &root, sync_interval),
            virtual_services: ConsulClient::new(kv.clone(), &root, sync_interval),
            roles: ConsulClient::new(kv.clone(), &root, sync_interval),
            attributes: ConsulClient::new(kv.clone(), &root, sync_interval),
            virtual_meshes: ConsulClient::new(kv.clone(), &root, sync_interval),
            files: ConsulClient::new(kv.clone(), &root, sync_interval),
            kv,
            root,
        })
    }

    /// Reads every item stored under the root, of any kind.
    ///
    /// Pairs are demultiplexed by their type flag; pairs with an unknown flag are skipped.
    pub async fn items(&self) -> Result<Vec<StorableItem>> {
        let prefix = prefix_of(&self.root, "");
        let (pairs, _) = self
            .kv
            .list(&prefix, None)
            .await
            .map_err(|error| Error::backend(format!("failed to list {prefix}"), error))?;

        let mut items = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let Some(kind) = Kind::from_flag(pair.flags) else {
                warn!(key = %pair.key, flags = pair.flags, "Skipping pair with unknown type flag");
                continue;
            };
            let Some(name) = pair.key.strip_prefix(&prefix_of(&self.root, kind.plural())) else {
                warn!(key = %pair.key, %kind, "Skipping pair stored outside its kind's prefix");
                continue;
            };
            let mut item = StorableItem::decode(pair.flags, name, &pair.value)?;
            item.set_resource_version(pair.modify_index.to_string());
            items.push(item);
        }
        Ok(items)
    }
}

#[async_trait::async_trait]
impl Storage for ConsulStorage {
    /// Nothing needs provisioning in Consul; this verifies the cluster is reachable and has a
    /// leader so that misconfiguration surfaces at startup.
    async fn register(&self) -> Result<()> {
        let leader = self
            .kv
            .leader()
            .await
            .map_err(|error| Error::backend("failed to reach consul", error))?;
        if leader.is_empty() {
            return Err(Error::backend("consul is unavailable", "no cluster leader"));
        }
        info!(%leader, root = %self.root, "Connected to consul");
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

/// Returns the key prefix, with a trailing slash, under which `plural` items are stored.
fn prefix_of(root: &str, plural: &str) -> String {
    match (root.is_empty(), plural.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("{plural}/"),
        (false, true) => format!("{root}/"),
        (false, false) => format!("{root}/{plural}/"),
    }
}
