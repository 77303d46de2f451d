use crate::{io_error, watch};
use gateway_storage_core::{
    validate_name, version, Error, File, Handlers, Kind, Resource, ResourceClient, Result,
    SharedHandler, Watcher,
};
use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};
use tokio::fs;
use tracing::debug;

/// Stores raw file blobs beneath a directory, one file per ref.
///
/// A blob's resource version is its modification time in nanoseconds, so versions order the
/// same way the counters of the YAML documents do. An update always moves the version forward:
/// when the new mtime does not exceed the old one, it is set one nanosecond past it.
#[derive(Clone, Debug)]
pub struct BlobClient {
    dir: PathBuf,
    sync_interval: Duration,
}

// === impl BlobClient ===

impl BlobClient {
    pub fn new(dir: PathBuf, sync_interval: Duration) -> Self {
        Self { dir, sync_interval }
    }

    fn path_for(&self, file_ref: &str) -> PathBuf {
        file_ref.split('/').fold(self.dir.clone(), |p, s| p.join(s))
    }

    fn ref_for(dir: &Path, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(dir).ok()?;
        let segments = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }

    fn version_of(path: &Path, meta: &std::fs::Metadata) -> Result<String> {
        let modified = meta
            .modified()
            .map_err(|error| io_error("stat", path, error))?;
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map_err(|error| Error::backend(format!("invalid mtime on {}", path.display()), error))?
            .as_nanos();
        Ok(nanos.to_string())
    }

    async fn stat(&self, path: &Path) -> Result<Option<String>> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Self::version_of(path, &meta).map(Some),
            Ok(_) => Ok(None),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error("stat", path, error)),
        }
    }

    async fn write(&self, path: &Path, file: &File) -> Result<String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| io_error("create", parent, error))?;
        }
        fs::write(path, &file.contents)
            .await
            .map_err(|error| io_error("write", path, error))?;
        self.stat(path)
            .await?
            .ok_or_else(|| Error::not_found(Kind::File, file.name()))
    }

    /// Writes `file` over a blob stored at version `previous`, making sure the new version orders
    /// after it even when the mtime did not move.
    async fn overwrite(&self, path: &Path, file: &File, previous: &str) -> Result<String> {
        let version = self.write(path, file).await?;
        let Ok(previous) = previous.parse::<u64>() else {
            return Ok(version);
        };
        if version.parse::<u64>().map_or(false, |v| v > previous) {
            return Ok(version);
        }

        let mtime = UNIX_EPOCH + Duration::from_nanos(previous.saturating_add(1));
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .open(&target)?
                .set_modified(mtime)
        })
        .await
        .map_err(|error| Error::backend(format!("failed to stamp {}", path.display()), error))?
        .map_err(|error| io_error("stamp", path, error))?;
        self.stat(path)
            .await?
            .ok_or_else(|| Error::not_found(Kind::File, file.name()))
    }

    async fn read_blob(&self, path: &Path) -> Result<File> {
        let file_ref = Self::ref_for(&self.dir, path).ok_or_else(|| {
            Error::validation(format!("{} is outside of {}", path.display(), self.dir.display()))
        })?;
        let contents = fs::read(path)
            .await
            .map_err(|error| io_error("read", path, error))?;
        let version = self
            .stat(path)
            .await?
            .ok_or_else(|| Error::not_found(Kind::File, &file_ref))?;
        let mut file = File::new(file_ref, contents);
        file.set_resource_version(version);
        Ok(file)
    }

    async fn list_blobs(&self) -> Result<Vec<File>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || walk(&dir))
            .await
            .map_err(|error| Error::backend("failed to list files", error))?
    }
}

fn walk(dir: &Path) -> Result<Vec<File>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|error| {
            Error::backend(format!("failed to list {}", dir.display()), error)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(file_ref) = BlobClient::ref_for(dir, path) else {
            continue;
        };
        let contents = std::fs::read(path).map_err(|error| io_error("read", path, error))?;
        let meta = entry.metadata().map_err(|error| {
            Error::backend(format!("failed to stat {}", path.display()), error)
        })?;
        let mut file = File::new(file_ref, contents);
        file.set_resource_version(BlobClient::version_of(path, &meta)?);
        files.push(file);
    }
    Ok(files)
}

#[async_trait::async_trait]
impl ResourceClient<File> for BlobClient {
    async fn create(&self, file: &File) -> Result<File> {
        let name = file.name();
        validate_name(Kind::File, name)?;
        debug!(kind = %Kind::File, %name, "Creating");

        let path = self.path_for(name);
        if self.stat(&path).await?.is_some() {
            return Err(Error::already_exists(Kind::File, name));
        }

        let version = self.write(&path, file).await?;
        let mut file = file.clone();
        file.set_resource_version(version);
        Ok(file)
    }

    async fn update(&self, file: &File) -> Result<File> {
        let name = file.name();
        validate_name(Kind::File, name)?;
        let provided = file.resource_version().ok_or_else(|| {
            Error::validation(format!("resource version must be set to update file {name:?}"))
        })?;
        debug!(kind = %Kind::File, %name, version = %provided, "Updating");

        let path = self.path_for(name);
        let current = self
            .stat(&path)
            .await?
            .ok_or_else(|| Error::not_found(Kind::File, name))?;
        if version::is_stale(provided, &current) {
            return Err(Error::conflict(Kind::File, name, provided, Some(current)));
        }

        let version = self.overwrite(&path, file, &current).await?;
        let mut file = file.clone();
        file.set_resource_version(version);
        Ok(file)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_name(Kind::File, name)?;
        debug!(kind = %Kind::File, %name, "Deleting");
        let path = self.path_for(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(Error::not_found(Kind::File, name))
            }
            Err(error) => Err(io_error("delete", &path, error)),
        }
    }

    async fn get(&self, name: &str) -> Result<File> {
        validate_name(Kind::File, name)?;
        let path = self.path_for(name);
        if self.stat(&path).await?.is_none() {
            return Err(Error::not_found(Kind::File, name));
        }
        self.read_blob(&path).await
    }

    async fn list(&self) -> Result<Vec<File>> {
        self.list_blobs().await
    }

    fn watch(&self, handlers: Vec<SharedHandler<File>>) -> Result<Watcher> {
        let source = self.clone();
        let handlers = Handlers::from(handlers);
        Ok(Watcher::new(
            format!("file/{}", Kind::File.plural()),
            move |stop| watch::run(source, handlers, stop),
        ))
    }
}

#[async_trait::async_trait]
impl watch::Source for BlobClient {
    type Item = File;

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    fn recursive(&self) -> bool {
        true
    }

    fn accepts(&self, path: &Path) -> bool {
        path.starts_with(&self.dir) && path != self.dir
    }

    async fn read(&self, path: &Path) -> Result<File> {
        self.read_blob(path).await
    }

    async fn list(&self) -> Result<Vec<File>> {
        self.list_blobs().await
    }
}
