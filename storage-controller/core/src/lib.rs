//! Gateway configuration storage
//!
//! This crate defines the backend-independent half of the storage core: the typed configuration
//! resources a gateway is driven by, the [`ResourceClient`] contract every backend implements for
//! each resource kind, and the watch machinery through which backends deliver change
//! notifications.
//!
//! ```text
//! [ Storage ] -> [ ResourceClient<T> ] -> watch() -> [ Watcher ] -> [ EventHandler<T> ]
//! ```
//!
//! Backends (filesystem, Consul, Kubernetes) are implemented in their own crates. They all share
//! the same optimistic-concurrency discipline: every write binds an item to a new resource
//! version, updates must echo back the version the caller last observed, and a stale version is
//! rejected with [`Error::VersionConflict`] without applying any part of the write.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod attribute;
mod client;
mod error;
mod file;
mod item;
mod kind;
mod resource;
mod role;
mod upstream;
pub mod version;
mod virtual_mesh;
mod virtual_service;
pub mod watch;


pub use self::{
    attribute::{Attribute, ListenerAttribute},
    client::{ResourceClient, Storage},
    error::{BoxError, Error, Result},
    file::File,
    item::StorableItem,
    kind::Kind,
    resource::{validate_name, Metadata, Resource, State, Status},
    role::{Listener, Role},
    upstream::{Function, ServiceInfo, Upstream},
    virtual_mesh::VirtualMesh,
    virtual_service::{
        Destination, EventMatcher, FunctionDestination, PathMatcher, RequestMatcher, Route,
        SslConfig, UpstreamDestination, VirtualService, WeightedDestination,
    },
    watch::{EventHandler, EventHandlerFuncs, Handlers, SharedHandler, Supervisor, Watcher},
};
pub use tokio_util::sync::CancellationToken;
