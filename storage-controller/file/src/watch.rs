use gateway_storage_core::{CancellationToken, Error, Handlers, Resource, Result};
use notify::{EventKind, RecursiveMode, Watcher as _};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{sync::mpsc, time};
use tracing::{debug, info, warn};

/// The shortest period between checks that the watched directory still exists.
const MIN_DIR_CHECK: Duration = Duration::from_secs(1);

/// A directory whose documents can be watched.
#[async_trait::async_trait]
pub(crate) trait Source: Send + Sync + 'static {
    type Item: Resource;

    fn dir(&self) -> &Path;

    fn sync_interval(&self) -> Duration;

    fn recursive(&self) -> bool;

    fn accepts(&self, path: &Path) -> bool;

    async fn read(&self, path: &Path) -> Result<Self::Item>;

    async fn list(&self) -> Result<Vec<Self::Item>>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Change {
    Created,
    Modified,
    Removed,
}

/// Watches the source's directory until `stop` is cancelled.
///
/// Subscribers first observe the current state through a single `on_add` without an item. Events
/// are then debounced over the sync interval and coalesced per path before being delivered, each
/// with a fresh listing of the directory.
///
/// The watch fails once the directory itself is removed.
pub(crate) async fn run<S: Source>(
    source: S,
    handlers: Handlers<S::Item>,
    stop: CancellationToken,
) -> Result<()> {
    let dir = source.dir().to_path_buf();
    if !is_dir(&dir).await {
        return Err(Error::backend(
            format!("cannot watch {}", dir.display()),
            "directory does not exist",
        ));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        // The receiver is gone once the watch stops; nothing to do with late events.
        let _ = tx.send(res);
    })
    .map_err(|error| Error::backend(format!("failed to watch {}", dir.display()), error))?;
    let mode = if source.recursive() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(&dir, mode)
        .map_err(|error| Error::backend(format!("failed to watch {}", dir.display()), error))?;
    info!(dir = %dir.display(), "Watching");

    // Some platforms report events against the canonical path of the watched directory.
    let canonical = tokio::fs::canonicalize(&dir).await.unwrap_or_else(|_| dir.clone());

    let items = source.list().await?;
    handlers.add(&items, None);

    // Not every platform reports the removal of the watched directory itself.
    let mut check = time::interval(source.sync_interval().max(MIN_DIR_CHECK));
    check.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        let first = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            _ = check.tick() => {
                if !is_dir(&dir).await {
                    return Err(removed(&dir));
                }
                continue;
            }
            ev = rx.recv() => ev,
        };
        let Some(first) = first else {
            return Err(Error::backend(
                format!("watch on {} ended", dir.display()),
                "filesystem watcher closed",
            ));
        };

        tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            _ = time::sleep(source.sync_interval()) => {}
        }
        let mut events = vec![first];
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }

        if !is_dir(&dir).await {
            return Err(removed(&dir));
        }
        for (path, change) in coalesce(&source, &canonical, events) {
            deliver(&source, &handlers, &path, change).await?;
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn removed(dir: &Path) -> Error {
    Error::backend(
        format!("watch on {} ended", dir.display()),
        "directory was removed",
    )
}

fn coalesce<S: Source>(
    source: &S,
    canonical: &Path,
    events: Vec<notify::Result<notify::Event>>,
) -> BTreeMap<PathBuf, Change> {
    let mut changes = BTreeMap::new();
    for ev in events {
        let ev = match ev {
            Ok(ev) => ev,
            Err(error) => {
                warn!(%error, "Filesystem watch error");
                continue;
            }
        };
        let change = match ev.kind {
            EventKind::Create(_) => Change::Created,
            EventKind::Modify(_) => Change::Modified,
            EventKind::Remove(_) => Change::Removed,
            _ => continue,
        };
        for path in ev.paths {
            let path = match path.strip_prefix(canonical) {
                Ok(rest) if canonical != source.dir() => source.dir().join(rest),
                _ => path,
            };
            if !source.accepts(&path) {
                continue;
            }
            changes
                .entry(path)
                .and_modify(|c: &mut Change| {
                    // A document created and then written within one window is still new.
                    if !(*c == Change::Created && change == Change::Modified) {
                        *c = change;
                    }
                })
                .or_insert(change);
        }
    }
    changes
}

async fn deliver<S: Source>(
    source: &S,
    handlers: &Handlers<S::Item>,
    path: &Path,
    change: Change,
) -> Result<()> {
    // Renames and editors' write-then-move patterns make the event kind unreliable; what is on
    // disk after the debounce window decides.
    let exists = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => true,
        Err(_) => false,
    };
    let change = match (change, exists) {
        (_, false) => Change::Removed,
        (Change::Removed, true) => Change::Modified,
        (c, true) => c,
    };
    debug!(path = %path.display(), ?change, "Change detected");

    let item = if change == Change::Removed {
        None
    } else {
        match source.read(path).await {
            Ok(item) => Some(item),
            Err(error) => {
                warn!(%error, "Skipping unreadable document");
                return Ok(());
            }
        }
    };

    let items = match source.list().await {
        Ok(items) => items,
        Err(_) if !is_dir(source.dir()).await => return Err(removed(source.dir())),
        Err(error) => {
            warn!(%error, "Failed to list after change");
            return Ok(());
        }
    };

    match change {
        Change::Created => handlers.add(&items, item.as_ref()),
        Change::Modified => handlers.update(&items, item.as_ref()),
        Change::Removed => handlers.delete(&items, None),
    }
    Ok(())
}
