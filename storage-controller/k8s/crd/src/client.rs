use crate::{
    resource::{validate_object_name, KubeResource},
    watch,
};
use gateway_storage_core::{
    Error, Handlers, ResourceClient, Result, SharedHandler, Watcher,
};
use gateway_storage_k8s_api::{ObjectMeta, ResourceExt};
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    runtime::watcher,
    Resource as _,
};
use std::{marker::PhantomData, time::Duration};
use tracing::debug;

/// Must be less than 295s or the API server rejects the watch.
const MAX_WATCH_TIMEOUT_SECS: u64 = 290;

/// Stores the items of one kind as objects in a namespace.
pub struct KubeClient<T: KubeResource> {
    api: Api<T::Object>,
    namespace: String,
    sync_interval: Duration,
    _marker: PhantomData<fn() -> T>,
}

// === impl KubeClient ===

impl<T: KubeResource> Clone for KubeClient<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            namespace: self.namespace.clone(),
            sync_interval: self.sync_interval,
            _marker: PhantomData,
        }
    }
}

impl<T: KubeResource> std::fmt::Debug for KubeClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient")
            .field("kind", &T::KIND)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<T: KubeResource> KubeClient<T> {
    pub fn new(client: kube::Client, namespace: &str, sync_interval: Duration) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            sync_interval,
            _marker: PhantomData,
        }
    }

    /// The identity of the object storing `item`.
    fn meta(&self, item: &T) -> ObjectMeta {
        let annotations = item
            .metadata()
            .map(|m| m.annotations.clone())
            .filter(|a| !a.is_empty());
        ObjectMeta {
            name: Some(T::object_name(item.name())),
            namespace: Some(self.namespace.clone()),
            annotations,
            ..ObjectMeta::default()
        }
    }

    /// Writes the status carried by `sent` if the main write did not persist it.
    async fn write_status(&self, mut sent: T::Object, stored: T::Object) -> Result<T::Object> {
        let wanted = T::object_status(&sent);
        if wanted.is_none() || wanted == T::object_status(&stored) {
            return Ok(stored);
        }
        let name = stored.name_any();
        sent.meta_mut().resource_version = stored.resource_version();
        let body = serde_json::to_vec(&sent)
            .map_err(|error| Error::backend(format!("failed to encode {} {name:?}", T::KIND), error))?;
        self.api
            .replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|error| self.error(&name, "failed to write status", error))
    }

    fn error(&self, name: &str, context: &str, error: kube::Error) -> Error {
        match status_code(&error) {
            Some(404) => Error::not_found(T::KIND, name),
            _ => Error::backend(format!("{context} of {} {name:?}", T::KIND), error),
        }
    }

    fn list_params(&self) -> ListParams {
        match T::label_selector() {
            Some(selector) => ListParams::default().labels(&selector),
            None => ListParams::default(),
        }
    }

    pub(crate) fn watcher_config(&self) -> watcher::Config {
        let timeout = self.sync_interval.as_secs().clamp(1, MAX_WATCH_TIMEOUT_SECS) as u32;
        let config = watcher::Config::default().timeout(timeout);
        match T::label_selector() {
            Some(selector) => config.labels(&selector),
            None => config,
        }
    }
}

#[async_trait::async_trait]
impl<T: KubeResource> ResourceClient<T> for KubeClient<T> {
    async fn create(&self, item: &T) -> Result<T> {
        let name = item.name();
        validate_object_name(T::KIND, name)?;
        debug!(kind = %T::KIND, %name, namespace = %self.namespace, "Creating");

        let obj = item.to_object(self.meta(item))?;
        let stored = match self.api.create(&PostParams::default(), &obj).await {
            Ok(stored) => stored,
            Err(error) if status_code(&error) == Some(409) => {
                return Err(Error::already_exists(T::KIND, name))
            }
            Err(error) => return Err(self.error(name, "failed to create", error)),
        };
        T::from_object(&self.write_status(obj, stored).await?)
    }

    async fn update(&self, item: &T) -> Result<T> {
        let name = item.name();
        validate_object_name(T::KIND, name)?;
        let provided = item.resource_version().ok_or_else(|| {
            Error::validation(format!("resource version must be set to update {} {name:?}", T::KIND))
        })?;
        debug!(kind = %T::KIND, %name, namespace = %self.namespace, %provided, "Updating");

        let object_name = T::object_name(name);
        let live = self
            .api
            .get(&object_name)
            .await
            .map_err(|error| self.error(name, "failed to read", error))?;

        let mut meta = self.meta(item);
        meta.resource_version = Some(provided.to_string());
        meta.labels = live.meta().labels.clone();
        let obj = item.to_object(meta)?;
        let stored = match self.api.replace(&object_name, &PostParams::default(), &obj).await {
            Ok(stored) => stored,
            Err(error) if status_code(&error) == Some(409) => {
                return Err(Error::conflict(
                    T::KIND,
                    name,
                    provided,
                    live.resource_version(),
                ))
            }
            Err(error) => return Err(self.error(name, "failed to update", error)),
        };
        T::from_object(&self.write_status(obj, stored).await?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_object_name(T::KIND, name)?;
        debug!(kind = %T::KIND, %name, namespace = %self.namespace, "Deleting");
        self.api
            .delete(&T::object_name(name), &DeleteParams::default())
            .await
            .map_err(|error| self.error(name, "failed to delete", error))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<T> {
        validate_object_name(T::KIND, name)?;
        let obj = self
            .api
            .get(&T::object_name(name))
            .await
            .map_err(|error| self.error(name, "failed to read", error))?;
        T::from_object(&obj)
    }

    async fn list(&self) -> Result<Vec<T>> {
        let objs = self.api.list(&self.list_params()).await.map_err(|error| {
            Error::backend(format!("failed to list {}", T::KIND.plural()), error)
        })?;
        let mut items = objs
            .items
            .iter()
            .map(T::from_object)
            .collect::<Result<Vec<_>>>()?;
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }

    fn watch(&self, handlers: Vec<SharedHandler<T>>) -> Result<Watcher> {
        let events = watcher(self.api.clone(), self.watcher_config());
        let handlers = Handlers::from(handlers);
        Ok(Watcher::new(
            format!("kube/{}", T::KIND.plural()),
            move |stop| watch::run::<T, _>(events, handlers, stop),
        ))
    }
}

/// Returns the HTTP status of an error the API server responded with.
pub(crate) fn status_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(rsp) => Some(rsp.code),
        _ => None,
    }
}
