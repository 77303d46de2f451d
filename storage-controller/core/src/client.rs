use crate::{
    Attribute, File, Resource, Result, Role, SharedHandler, Upstream, VirtualMesh,
    VirtualService, Watcher,
};

/// Create, read, update, delete and watch the items of one resource kind on one backend.
///
/// Every backend presents the same semantics:
///
/// - `create` fails with [`Error::AlreadyExists`](crate::Error::AlreadyExists) if the name is
///   taken, and otherwise returns the stored item with its assigned resource version.
/// - `update` requires the item to carry the resource version the caller last observed. A missing
///   version is a validation error, a stale one a version conflict, and an unknown name is
///   not-found. A rejected update leaves storage untouched.
/// - `list` order is backend-defined.
/// - `watch` returns a [`Watcher`] that does nothing until it is run.
#[async_trait::async_trait]
pub trait ResourceClient<T: Resource>: Send + Sync {
    async fn create(&self, item: &T) -> Result<T>;

    async fn update(&self, item: &T) -> Result<T>;

    async fn delete(&self, name: &str) -> Result<()>;

    async fn get(&self, name: &str) -> Result<T>;

    async fn list(&self) -> Result<Vec<T>>;

    fn watch(&self, handlers: Vec<SharedHandler<T>>) -> Result<Watcher>;
}

/// A handle to all resource clients of one backend.
///
/// [`Storage::register`] provisions whatever the backend needs before clients are used
/// (directories, CRDs, ...) and is idempotent.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn register(&self) -> Result<()>;

    fn upstreams(&self) -> &dyn ResourceClient<Upstream>;

    fn virtual_services(&self) -> &dyn ResourceClient<VirtualService>;

    fn roles(&self) -> &dyn ResourceClient<Role>;

    fn attributes(&self) -> &dyn ResourceClient<Attribute>;

    fn virtual_meshes(&self) -> &dyn ResourceClient<VirtualMesh>;

    fn files(&self) -> &dyn ResourceClient<File>;
}
