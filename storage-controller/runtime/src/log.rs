use crate::core::{EventHandler, Resource, SharedHandler};
use std::sync::Arc;
use tracing::info;

/// Logs every change notification it receives.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct LogChanges;

pub(crate) fn handler<T: Resource>() -> SharedHandler<T> {
    Arc::new(LogChanges)
}

impl<T: Resource> EventHandler<T> for LogChanges {
    fn on_add(&self, items: &[T], added: Option<&T>) {
        let name = added.map(Resource::name);
        info!(kind = %T::KIND, items = items.len(), ?name, "Added");
    }

    fn on_update(&self, items: &[T], updated: Option<&T>) {
        let name = updated.map(Resource::name);
        let version = updated.and_then(Resource::resource_version);
        info!(kind = %T::KIND, items = items.len(), ?name, ?version, "Updated");
    }

    fn on_delete(&self, items: &[T], deleted: Option<&T>) {
        let name = deleted.map(Resource::name);
        info!(kind = %T::KIND, items = items.len(), ?name, "Deleted");
    }
}
