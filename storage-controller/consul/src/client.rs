use crate::{
    kv::{KvClient, KvPair},
    prefix_of, watch,
};
use gateway_storage_core::{
    validate_name, Error, Handlers, Resource, ResourceClient, Result, SharedHandler, Watcher,
};
use std::{marker::PhantomData, time::Duration};
use tracing::debug;

/// Stores items of one kind under `<root>/<plural>/`.
pub struct ConsulClient<T> {
    kv: KvClient,
    prefix: String,
    sync_interval: Duration,
    _marker: PhantomData<fn() -> T>,
}

// === impl ConsulClient ===

impl<T> Clone for ConsulClient<T> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            prefix: self.prefix.clone(),
            sync_interval: self.sync_interval,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ConsulClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulClient")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<T: Resource> ConsulClient<T> {
    pub(crate) fn new(kv: KvClient, root: &str, sync_interval: Duration) -> Self {
        Self {
            kv,
            prefix: prefix_of(root, T::KIND.plural()),
            sync_interval,
            _marker: PhantomData,
        }
    }

    pub(crate) fn kv(&self) -> &KvClient {
        &self.kv
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    fn key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Decodes a pair read from this client's prefix.
    ///
    /// Returns `None` for pairs that hold another kind of item or that are not addressable by a
    /// valid name.
    pub(crate) fn decode(&self, pair: &KvPair) -> Result<Option<T>> {
        if pair.flags != T::KIND.flag() {
            debug!(key = %pair.key, flags = pair.flags, "Skipping pair of another kind");
            return Ok(None);
        }
        let Some(name) = pair.key.strip_prefix(&self.prefix) else {
            return Ok(None);
        };
        if validate_name(T::KIND, name).is_err() {
            debug!(key = %pair.key, "Skipping pair with an invalid name");
            return Ok(None);
        }
        let mut item = T::from_bytes(name, &pair.value)?;
        item.set_resource_version(pair.modify_index.to_string());
        Ok(Some(item))
    }

    async fn read(&self, name: &str) -> Result<Option<KvPair>> {
        let key = self.key(name);
        self.kv
            .get(&key)
            .await
            .map_err(|error| Error::backend(format!("failed to read {key}"), error))
    }

    async fn write(&self, item: &T, cas: u64) -> Result<bool> {
        let key = self.key(item.name());
        self.kv
            .put(&key, item.to_bytes()?, T::KIND.flag(), Some(cas))
            .await
            .map_err(|error| Error::backend(format!("failed to write {key}"), error))
    }

    /// Re-reads an item after a successful write to learn the version Consul assigned it.
    async fn stored(&self, item: &T) -> Result<T> {
        let name = item.name();
        let pair = self
            .read(name)
            .await?
            .ok_or_else(|| Error::not_found(T::KIND, name))?;
        let mut item = item.clone();
        item.set_resource_version(pair.modify_index.to_string());
        Ok(item)
    }

    pub(crate) async fn list_items(&self) -> Result<Vec<T>> {
        let (pairs, _) = self
            .kv
            .list(&self.prefix, None)
            .await
            .map_err(|error| Error::backend(format!("failed to list {}", self.prefix), error))?;
        let mut items = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            if let Some(item) = self.decode(pair)? {
                items.push(item);
            }
        }
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }
}

#[async_trait::async_trait]
impl<T: Resource> ResourceClient<T> for ConsulClient<T> {
    async fn create(&self, item: &T) -> Result<T> {
        let name = item.name();
        validate_name(T::KIND, name)?;
        debug!(kind = %T::KIND, %name, "Creating");

        if self.read(name).await?.is_some() {
            return Err(Error::already_exists(T::KIND, name));
        }
        // A check-and-set against index 0 only writes if the key is still absent, so a
        // concurrent creator loses here rather than overwriting.
        if !self.write(item, 0).await? {
            return Err(Error::already_exists(T::KIND, name));
        }
        self.stored(item).await
    }

    async fn update(&self, item: &T) -> Result<T> {
        let name = item.name();
        validate_name(T::KIND, name)?;
        let provided = item.resource_version().ok_or_else(|| {
            Error::validation(format!("resource version must be set to update {} {name:?}", T::KIND))
        })?;
        let index = match provided.parse::<u64>() {
            Ok(index) if index > 0 => index,
            _ => {
                return Err(Error::validation(format!(
                    "resource version {provided:?} of {} {name:?} is not a consul index",
                    T::KIND
                )))
            }
        };
        debug!(kind = %T::KIND, %name, %index, "Updating");

        if self.write(item, index).await? {
            return self.stored(item).await;
        }
        match self.read(name).await? {
            None => Err(Error::not_found(T::KIND, name)),
            Some(pair) => Err(Error::conflict(
                T::KIND,
                name,
                provided,
                Some(pair.modify_index.to_string()),
            )),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_name(T::KIND, name)?;
        debug!(kind = %T::KIND, %name, "Deleting");
        if self.read(name).await?.is_none() {
            return Err(Error::not_found(T::KIND, name));
        }
        let key = self.key(name);
        self.kv
            .delete(&key)
            .await
            .map_err(|error| Error::backend(format!("failed to delete {key}"), error))?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<T> {
        validate_name(T::KIND, name)?;
        let pair = self
            .read(name)
            .await?
            .ok_or_else(|| Error::not_found(T::KIND, name))?;
        self.decode(&pair)?
            .ok_or_else(|| Error::not_found(T::KIND, name))
    }

    async fn list(&self) -> Result<Vec<T>> {
        self.list_items().await
    }

    fn watch(&self, handlers: Vec<SharedHandler<T>>) -> Result<Watcher> {
        let client = self.clone();
        let handlers = Handlers::from(handlers);
        Ok(Watcher::new(
            format!("consul/{}", T::KIND.plural()),
            move |stop| watch::run(client, handlers, stop),
        ))
    }
}
