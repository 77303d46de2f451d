use crate::{
    Attribute, Error, Kind, Result, Role, Upstream, VirtualMesh, VirtualService,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Storage-side bookkeeping shared by every resource.
///
/// The resource version is always assigned by the backend. Values supplied by callers are only
/// ever used to authorize an update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Reported by the data plane. Persisted by every backend but never interpreted by them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub state: State,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum State {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// The capability every storable resource exposes to the generic backends.
///
/// Backends never inspect a resource's payload; they address it by [`Resource::name`], persist
/// [`Resource::to_bytes`] (or a structured equivalent), and stamp the version they assign.
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: Kind;

    fn name(&self) -> &str;

    fn metadata(&self) -> Option<&Metadata>;

    /// Returns the item's metadata, creating an empty one if it has none.
    fn metadata_mut(&mut self) -> &mut Metadata;

    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Decodes an item stored under `name`. The storage key is authoritative for the name.
    fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self>;

    /// The version the caller last observed, if any.
    fn resource_version(&self) -> Option<&str> {
        self.metadata()
            .map(|m| m.resource_version.as_str())
            .filter(|v| !v.is_empty())
    }

    fn set_resource_version(&mut self, version: String) {
        self.metadata_mut().resource_version = version;
    }
}

/// Checks that `name` can be used as a storage key for `kind`.
///
/// File refs may be nested paths; every other kind must be a single path segment.
pub fn validate_name(kind: Kind, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation(format!("{kind} name must not be empty")));
    }

    if kind == Kind::File {
        if name.starts_with('/') || name.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(Error::validation(format!("invalid file ref {name:?}")));
        }
        return Ok(());
    }

    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::validation(format!("invalid {kind} name {name:?}")));
    }
    Ok(())
}

macro_rules! config_resource {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl Resource for $ty {
                const KIND: Kind = Kind::$ty;

                #[inline]
                fn name(&self) -> &str {
                    &self.name
                }

                #[inline]
                fn metadata(&self) -> Option<&Metadata> {
                    self.metadata.as_ref()
                }

                fn metadata_mut(&mut self) -> &mut Metadata {
                    self.metadata.get_or_insert_with(Metadata::default)
                }

                fn to_bytes(&self) -> Result<Vec<u8>> {
                    serde_json::to_vec(self).map_err(|error| {
                        Error::backend(format!("failed to encode {} {:?}", Self::KIND, self.name), error)
                    })
                }

                fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
                    let mut item = serde_json::from_slice::<Self>(bytes).map_err(|error| {
                        Error::backend(format!("failed to decode {} {name:?}", Self::KIND), error)
                    })?;
                    item.name = name.to_string();
                    Ok(item)
                }
            }
        )+
    };
}

config_resource!(Upstream, VirtualService, Role, Attribute, VirtualMesh);
