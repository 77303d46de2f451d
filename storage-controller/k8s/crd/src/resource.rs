use gateway_storage_core::{
    validate_name, Attribute, Error, File, Kind, Metadata, Resource, Result, Role, Upstream,
    VirtualMesh, VirtualService,
};
use gateway_storage_k8s_api::{self as api, file, ConfigObject, ObjectMeta, ResourceExt};
use kube::core::NamespaceResourceScope;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Fields of a resource's JSON form that live outside of a custom resource's spec.
const NON_SPEC_FIELDS: [&str; 3] = ["name", "metadata", "status"];

static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS subdomain pattern must compile")
});

/// A resource that is stored as a Kubernetes object.
pub trait KubeResource: Resource {
    type Object: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + fmt::Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static;

    /// Restricts listing and watching to matching objects.
    fn label_selector() -> Option<String> {
        None
    }

    fn object_name(name: &str) -> String {
        name.to_string()
    }

    /// Builds the object storing `self`. `meta` carries the object's identity and any
    /// labels or version the write must present.
    fn to_object(&self, meta: ObjectMeta) -> Result<Self::Object>;

    fn from_object(obj: &Self::Object) -> Result<Self>;

    /// Returns the status an object carries, for kinds that have a status subresource.
    fn object_status(_: &Self::Object) -> Option<&api::ResourceStatus> {
        None
    }
}

/// Checks that `name` can be stored as a Kubernetes object of `kind`.
pub fn validate_object_name(kind: Kind, name: &str) -> Result<()> {
    validate_name(kind, name)?;
    let object = match kind {
        Kind::File => file::object_name(name),
        _ => name.to_string(),
    };
    if object.len() > 253 || !DNS_SUBDOMAIN.is_match(&object) {
        return Err(Error::validation(format!(
            "{kind} name {name:?} is not a valid DNS-1123 subdomain"
        )));
    }
    Ok(())
}

/// Copies the storage-side metadata of an object onto an item.
fn stamp<T: Resource>(item: &mut T, meta: &ObjectMeta, skip_annotation: Option<&str>) {
    let annotations = meta
        .annotations
        .iter()
        .flatten()
        .filter(|(k, _)| Some(k.as_str()) != skip_annotation)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    *item.metadata_mut() = Metadata {
        resource_version: meta.resource_version.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        annotations,
    };
}

/// Splits an item's JSON form into a spec map and a status.
fn to_parts<T: Resource>(item: &T) -> Result<(Map<String, Value>, Option<api::ResourceStatus>)> {
    let encode_err = |error: serde_json::Error| {
        Error::backend(format!("failed to encode {} {:?}", T::KIND, item.name()), error)
    };
    let mut fields = match serde_json::from_slice::<Value>(&item.to_bytes()?).map_err(encode_err)? {
        Value::Object(fields) => fields,
        _ => {
            return Err(Error::backend(
                format!("failed to encode {} {:?}", T::KIND, item.name()),
                "not a JSON object",
            ))
        }
    };
    let status = fields
        .remove("status")
        .map(serde_json::from_value)
        .transpose()
        .map_err(encode_err)?;
    for field in NON_SPEC_FIELDS {
        fields.remove(field);
    }
    Ok((fields, status))
}

fn from_parts<T: Resource>(
    name: &str,
    mut fields: Map<String, Value>,
    status: Option<&api::ResourceStatus>,
) -> Result<T> {
    let decode_err =
        |error: serde_json::Error| Error::backend(format!("failed to decode {} {name:?}", T::KIND), error);
    fields.insert("name".to_string(), Value::String(name.to_string()));
    if let Some(status) = status {
        fields.insert(
            "status".to_string(),
            serde_json::to_value(status).map_err(decode_err)?,
        );
    }
    let bytes = serde_json::to_vec(&Value::Object(fields)).map_err(decode_err)?;
    T::from_bytes(name, &bytes)
}

macro_rules! config_object {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl KubeResource for $ty {
                type Object = api::$ty;

                fn to_object(&self, meta: ObjectMeta) -> Result<Self::Object> {
                    let (spec, status) = to_parts(self)?;
                    Ok(api::$ty::from_parts(meta, spec, status))
                }

                fn from_object(obj: &Self::Object) -> Result<Self> {
                    let name = obj.name_any();
                    let mut item: Self =
                        from_parts(&name, obj.spec_fields().clone(), obj.resource_status())?;
                    stamp(&mut item, &obj.metadata, None);
                    Ok(item)
                }

                #[inline]
                fn object_status(obj: &Self::Object) -> Option<&api::ResourceStatus> {
                    obj.resource_status()
                }
            }
        )+
    };
}

config_object!(Upstream, VirtualService, Role, Attribute, VirtualMesh);

impl KubeResource for File {
    type Object = api::ConfigMap;

    fn label_selector() -> Option<String> {
        Some(file::selector())
    }

    fn object_name(name: &str) -> String {
        file::object_name(name)
    }

    fn to_object(&self, meta: ObjectMeta) -> Result<Self::Object> {
        Ok(file::to_config_map(&self.file_ref, self.contents.clone(), meta))
    }

    fn from_object(cm: &Self::Object) -> Result<Self> {
        let file_ref = file::file_ref(cm).ok_or_else(|| {
            Error::backend("failed to decode File", "ConfigMap has neither a name nor a ref")
        })?;
        let mut item = File::new(file_ref, file::contents(cm));
        stamp(&mut item, &cm.metadata, Some(file::REF_ANNOTATION));
        Ok(item)
    }
}
