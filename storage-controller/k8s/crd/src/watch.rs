use crate::resource::KubeResource;
use futures::prelude::*;
use gateway_storage_core::{CancellationToken, Error, Handlers, Result};
use gateway_storage_k8s_api::ResourceExt;
use kube::runtime::watcher::{self, Event};
use std::{collections::BTreeMap, time::Duration};
use tokio::time;
use tracing::{debug, info, warn};

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// The items a watch has observed, keyed by object name.
struct Cache<T>(BTreeMap<String, T>);

/// Drives a watcher event stream until `stop` is cancelled.
///
/// Every (re)list replaces the cache and is reported as `on_add` of the whole list. Individual
/// changes are reported as `on_add` or `on_update` depending on whether the object was cached.
///
/// A stream error before the first list succeeds ends the watch. Later errors are logged and the
/// stream is polled again after a second, at which point the watcher relists.
pub(crate) async fn run<T, S>(events: S, handlers: Handlers<T>, stop: CancellationToken) -> Result<()>
where
    T: KubeResource,
    S: Stream<Item = watcher::Result<Event<T::Object>>> + Send + 'static,
{
    let kind = T::KIND;
    tokio::pin!(events);
    let mut cache = Cache(BTreeMap::new());
    let mut initialized = false;
    info!(%kind, "Watching");

    loop {
        let ev = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            ev = events.next() => ev,
        };
        match ev {
            Some(Ok(ev)) => {
                initialized = true;
                cache.apply(ev, &handlers);
            }
            Some(Err(error)) if !initialized => {
                return Err(Error::backend(format!("failed to list {}", kind.plural()), error));
            }
            Some(Err(error)) => {
                warn!(%kind, %error, "Failed");
                tokio::select! {
                    _ = stop.cancelled() => return Ok(()),
                    _ = time::sleep(RETRY_BACKOFF) => info!(%kind, "Restarting"),
                }
            }
            None => {
                return Err(Error::backend(
                    format!("failed to watch {}", kind.plural()),
                    "watch stream terminated",
                ))
            }
        }
    }
}

// === impl Cache ===

impl<T: KubeResource> Cache<T> {
    fn apply(&mut self, ev: Event<T::Object>, handlers: &Handlers<T>) {
        match ev {
            Event::Restarted(objs) => {
                self.0 = objs
                    .iter()
                    .filter_map(|obj| Some((obj.name_any(), decode::<T>(obj)?)))
                    .collect();
                debug!(kind = %T::KIND, items = self.0.len(), "Restarted");
                handlers.add(&self.items(), None);
            }

            Event::Applied(obj) => {
                let Some(item) = decode::<T>(&obj) else {
                    return;
                };
                let existed = self.0.insert(obj.name_any(), item.clone()).is_some();
                let items = self.items();
                if existed {
                    handlers.update(&items, Some(&item));
                } else {
                    handlers.add(&items, Some(&item));
                }
            }

            Event::Deleted(obj) => {
                let Some(item) = self.0.remove(&obj.name_any()) else {
                    debug!(kind = %T::KIND, name = %obj.name_any(), "Ignoring deletion of unknown object");
                    return;
                };
                handlers.delete(&self.items(), Some(&item));
            }
        }
    }

    fn items(&self) -> Vec<T> {
        let mut items = self.0.values().cloned().collect::<Vec<_>>();
        items.sort_by(|a, b| a.name().cmp(b.name()));
        items
    }
}

/// Objects that cannot be decoded are skipped so one bad object cannot stall the watch.
fn decode<T: KubeResource>(obj: &T::Object) -> Option<T> {
    match T::from_object(obj) {
        Ok(item) => Some(item),
        Err(error) => {
            warn!(kind = %T::KIND, name = %obj.name_any(), %error, "Skipping undecodable object");
            None
        }
    }
}
