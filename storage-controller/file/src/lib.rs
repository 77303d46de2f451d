//! Filesystem storage backend
//!
//! Every resource kind owns a directory under the storage root and every resource is one YAML
//! file named after it:
//!
//! ```text
//! <root>/upstreams/<name>.yml
//! <root>/virtualservices/<name>.yml
//! ...
//! <root>/files/<ref>
//! ```
//!
//! Resource versions are decimal counters stored in each document's metadata (see
//! [`gateway_storage_core::version`]). This backend takes no locks: two writers racing on the same
//! name both pass the existence check before either writes, so concurrent writers must coordinate
//! externally.
//!
//! Listing is fail-fast: one document that does not parse fails the whole listing.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod blob;
mod client;
mod watch;


pub use self::{blob::BlobClient, client::FileClient};
use gateway_storage_core::{
    Attribute, Error, File, Kind, ResourceClient, Result, Role, Storage, Upstream, VirtualMesh,
    VirtualService,
};
use std::{path::PathBuf, time::Duration};
use tracing::info;

/// Aggregates a client for every resource kind rooted at one directory.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
    upstreams: FileClient<Upstream>,
    virtual_services: FileClient<VirtualService>,
    roles: FileClient<Role>,
    attributes: FileClient<Attribute>,
    virtual_meshes: FileClient<VirtualMesh>,
    files: BlobClient,
}

// === impl FileStorage ===

impl FileStorage {
    /// `sync_interval` is the debounce window applied to filesystem events while watching.
    pub fn new(root: impl Into<PathBuf>, sync_interval: Duration) -> Self {
        let root = root.into();
        Self {
            upstreams: FileClient::new(root.join(Kind::Upstream.plural()), sync_interval),
            virtual_services: FileClient::new(
                root.join(Kind::VirtualService.plural()),
                sync_interval,
            ),
            roles: FileClient::new(root.join(Kind::Role.plural()), sync_interval),
            attributes: FileClient::new(root.join(Kind::Attribute.plural()), sync_interval),
            virtual_meshes: FileClient::new(root.join(Kind::VirtualMesh.plural()), sync_interval),
            files: BlobClient::new(root.join(Kind::File.plural()), sync_interval),
            root,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl Storage for FileStorage {
    async fn register(&self) -> Result<()> {
        for kind in Kind::ALL {
            let dir = self.root.join(kind.plural());
            tokio::fs::create_dir_all(&dir).await.map_err(|error| {
                Error::backend(format!("failed to create {}", dir.display()), error)
            })?;
        }
        info!(root = %self.root.display(), "Registered storage directories");
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

fn io_error(context: impl std::fmt::Display, path: &std::path::Path, error: std::io::Error) -> Error {
    Error::backend(format!("failed to {context} {}", path.display()), error)
}
