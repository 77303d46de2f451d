//! Change notification.
//!
//! A backend's `watch` produces a [`Watcher`]: a named task that, once run, delivers the current
//! state of one resource kind to a set of [`EventHandler`]s and then keeps delivering it as it
//! changes. Each callback receives the full list of items as known after the change; the changed
//! item itself is passed when the backend can provide it.
//!
//! Watchers are cooperative: they stop when their [`CancellationToken`] is cancelled. A watcher
//! returns an error only when it cannot continue; transient backend errors are retried by the
//! backend. The [`Supervisor`] owns a group of watchers and joins them on shutdown.

use crate::{Error, Result};
use futures::future::BoxFuture;
use std::{fmt, future::Future, sync::Arc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// Receives change notifications for items of type `T`.
///
/// All methods default to doing nothing so implementors only handle the events they care about.
/// Handlers are invoked on the watcher's task and must not block for long.
pub trait EventHandler<T>: Send + Sync {
    fn on_add(&self, _items: &[T], _added: Option<&T>) {}

    fn on_update(&self, _items: &[T], _updated: Option<&T>) {}

    fn on_delete(&self, _items: &[T], _deleted: Option<&T>) {}
}

pub type SharedHandler<T> = Arc<dyn EventHandler<T>>;

type Callback<T> = Box<dyn Fn(&[T], Option<&T>) + Send + Sync>;

/// An [`EventHandler`] assembled from closures.
pub struct EventHandlerFuncs<T> {
    add: Option<Callback<T>>,
    update: Option<Callback<T>>,
    delete: Option<Callback<T>>,
}

/// Fans a notification out to every registered handler.
pub struct Handlers<T>(Vec<SharedHandler<T>>);

/// A named background task delivering change notifications.
pub struct Watcher {
    name: String,
    run: Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<()>> + Send>,
}

/// Runs a group of watchers and stops them together.
pub struct Supervisor {
    stop: CancellationToken,
    tasks: JoinSet<(String, Result<()>)>,
}

// === impl EventHandlerFuncs ===

impl<T> Default for EventHandlerFuncs<T> {
    fn default() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
        }
    }
}

impl<T> EventHandlerFuncs<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_add(mut self, f: impl Fn(&[T], Option<&T>) + Send + Sync + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    pub fn with_update(mut self, f: impl Fn(&[T], Option<&T>) + Send + Sync + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn with_delete(mut self, f: impl Fn(&[T], Option<&T>) + Send + Sync + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl<T> EventHandler<T> for EventHandlerFuncs<T> {
    fn on_add(&self, items: &[T], added: Option<&T>) {
        if let Some(f) = self.add.as_ref() {
            f(items, added)
        }
    }

    fn on_update(&self, items: &[T], updated: Option<&T>) {
        if let Some(f) = self.update.as_ref() {
            f(items, updated)
        }
    }

    fn on_delete(&self, items: &[T], deleted: Option<&T>) {
        if let Some(f) = self.delete.as_ref() {
            f(items, deleted)
        }
    }
}

impl<T> fmt::Debug for EventHandlerFuncs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlerFuncs")
            .field("add", &self.add.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

// === impl Handlers ===

impl<T> From<Vec<SharedHandler<T>>> for Handlers<T> {
    fn from(handlers: Vec<SharedHandler<T>>) -> Self {
        Self(handlers)
    }
}

impl<T> Handlers<T> {
    pub fn add(&self, items: &[T], added: Option<&T>) {
        for h in &self.0 {
            h.on_add(items, added);
        }
    }

    pub fn update(&self, items: &[T], updated: Option<&T>) {
        for h in &self.0 {
            h.on_update(items, updated);
        }
    }

    pub fn delete(&self, items: &[T], deleted: Option<&T>) {
        for h in &self.0 {
            h.on_delete(items, deleted);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// === impl Watcher ===

impl Watcher {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |stop: CancellationToken| -> BoxFuture<'static, Result<()>> {
                Box::pin(run(stop))
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delivers notifications until `stop` is cancelled or the backend fails.
    pub async fn run(self, stop: CancellationToken) -> Result<()> {
        let Self { name, run } = self;
        info!(watcher = %name, "Starting");
        let res = run(stop).await;
        match res.as_ref() {
            Ok(()) => info!(watcher = %name, "Stopped"),
            Err(error) => error!(watcher = %name, %error, "Failed"),
        }
        res
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher").field("name", &self.name).finish()
    }
}

// === impl Supervisor ===

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl Supervisor {
    /// Creates a supervisor whose watchers also stop when `stop` is cancelled.
    pub fn new(stop: CancellationToken) -> Self {
        Self {
            stop,
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn(&mut self, watcher: Watcher) {
        let stop = self.stop.child_token();
        let span = info_span!("watch", name = %watcher.name());
        self.tasks.spawn(
            async move {
                let name = watcher.name().to_string();
                let res = watcher.run(stop).await;
                (name, res)
            }
            .instrument(span),
        );
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for the next watcher to fail.
    ///
    /// Returns `None` once every watcher has exited.
    pub async fn next_error(&mut self) -> Option<(String, Error)> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(error))) => return Some((name, error)),
                Err(error) => return Some(("<unknown>".to_string(), panicked(error))),
            }
        }
        None
    }

    /// Stops every watcher and waits for them to exit, returning the errors that ended any of
    /// them.
    pub async fn shutdown(mut self) -> Vec<(String, Error)> {
        self.stop.cancel();
        let mut errors = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(error))) => errors.push((name, error)),
                Err(error) => errors.push(("<unknown>".to_string(), panicked(error))),
            }
        }
        errors
    }
}

fn panicked(error: tokio::task::JoinError) -> Error {
    Error::backend("watcher task failed", error)
}
