use crate::{io_error, watch};
use gateway_storage_core::{
    validate_name, version, Error, Handlers, Resource, ResourceClient, Result, SharedHandler,
    Watcher,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    io,
    marker::PhantomData,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tracing::debug;

const EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Stores one YAML document per resource in a single directory.
pub struct FileClient<T> {
    dir: PathBuf,
    sync_interval: Duration,
    _marker: PhantomData<fn() -> T>,
}

// === impl FileClient ===

impl<T> Clone for FileClient<T> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            sync_interval: self.sync_interval,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for FileClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileClient")
            .field("dir", &self.dir)
            .field("sync_interval", &self.sync_interval)
            .finish()
    }
}

impl<T> FileClient<T> {
    pub fn new(dir: PathBuf, sync_interval: Duration) -> Self {
        Self {
            dir,
            sync_interval,
            _marker: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn is_document(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| EXTENSIONS.contains(&e))
            .unwrap_or(false)
    }

    /// Finds the document holding `name`, whichever extension it was written with.
    async fn find(&self, name: &str) -> Result<Option<PathBuf>> {
        for ext in EXTENSIONS {
            let path = self.dir.join(format!("{name}.{ext}"));
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => return Ok(Some(path)),
                Ok(_) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(io_error("stat", &path, error)),
            }
        }
        Ok(None)
    }
}

impl<T> FileClient<T>
where
    T: Resource + Serialize + DeserializeOwned,
{
    /// Reads the document at `path`. The file name is authoritative for the item's name.
    pub(crate) async fn read(&self, path: &Path) -> Result<T> {
        let name = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
            Error::validation(format!("{} does not name a {}", path.display(), T::KIND))
        })?;
        let contents = fs::read_to_string(path)
            .await
            .map_err(|error| io_error("read", path, error))?;
        let parse_err =
            |error: serde_yaml::Error| Error::backend(format!("failed to parse {}", path.display()), error);
        let mut doc = serde_yaml::from_str::<serde_yaml::Value>(&contents).map_err(parse_err)?;
        if let serde_yaml::Value::Mapping(fields) = &mut doc {
            fields.insert("name".into(), name.into());
        }
        serde_yaml::from_value(doc).map_err(parse_err)
    }

    async fn write(&self, path: &Path, item: &T) -> Result<()> {
        let contents = serde_yaml::to_string(item).map_err(|error| {
            Error::backend(format!("failed to encode {} {:?}", T::KIND, item.name()), error)
        })?;
        fs::write(path, contents)
            .await
            .map_err(|error| io_error("write", path, error))
    }

    async fn existing(&self, name: &str) -> Result<PathBuf> {
        self.find(name)
            .await?
            .ok_or_else(|| Error::not_found(T::KIND, name))
    }

    pub(crate) async fn list_items(&self) -> Result<Vec<T>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|error| io_error("list", &self.dir, error))?;

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| io_error("list", &self.dir, error))?
        {
            let path = entry.path();
            if !Self::is_document(&path) {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map_err(|error| io_error("stat", &path, error))?
                .is_file();
            if is_file {
                items.push(self.read(&path).await?);
            }
        }
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }
}

#[async_trait::async_trait]
impl<T> ResourceClient<T> for FileClient<T>
where
    T: Resource + Serialize + DeserializeOwned,
{
    async fn create(&self, item: &T) -> Result<T> {
        let name = item.name();
        validate_name(T::KIND, name)?;
        debug!(kind = %T::KIND, %name, "Creating");

        if self.find(name).await?.is_some() {
            return Err(Error::already_exists(T::KIND, name));
        }

        let mut item = item.clone();
        item.set_resource_version(version::next(None));
        let path = self.dir.join(format!("{name}.yml"));
        self.write(&path, &item).await?;
        Ok(item)
    }

    async fn update(&self, item: &T) -> Result<T> {
        let name = item.name();
        validate_name(T::KIND, name)?;
        let provided = item.resource_version().ok_or_else(|| {
            Error::validation(format!("resource version must be set to update {} {name:?}", T::KIND))
        })?;
        debug!(kind = %T::KIND, %name, version = %provided, "Updating");

        let path = self.existing(name).await?;
        let stored = self.read(&path).await?;
        let current = stored.resource_version().unwrap_or_default();
        if version::is_stale(provided, current) {
            return Err(Error::conflict(
                T::KIND,
                name,
                provided,
                Some(current.to_string()),
            ));
        }

        let mut item = item.clone();
        item.set_resource_version(version::next(Some(current)));
        self.write(&path, &item).await?;
        Ok(item)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_name(T::KIND, name)?;
        debug!(kind = %T::KIND, %name, "Deleting");
        let path = self.existing(name).await?;
        fs::remove_file(&path)
            .await
            .map_err(|error| io_error("delete", &path, error))
    }

    async fn get(&self, name: &str) -> Result<T> {
        validate_name(T::KIND, name)?;
        let path = self.existing(name).await?;
        self.read(&path).await
    }

    async fn list(&self) -> Result<Vec<T>> {
        self.list_items().await
    }

    fn watch(&self, handlers: Vec<SharedHandler<T>>) -> Result<Watcher> {
        let source = self.clone();
        let handlers = Handlers::from(handlers);
        Ok(Watcher::new(
            format!("file/{}", T::KIND.plural()),
            move |stop| watch::run(source, handlers, stop),
        ))
    }
}

#[async_trait::async_trait]
impl<T> watch::Source for FileClient<T>
where
    T: Resource + Serialize + DeserializeOwned,
{
    type Item = T;

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    fn recursive(&self) -> bool {
        false
    }

    fn accepts(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path()) && Self::is_document(path)
    }

    async fn read(&self, path: &Path) -> Result<T> {
        FileClient::read(self, path).await
    }

    async fn list(&self) -> Result<Vec<T>> {
        self.list_items().await
    }
}
