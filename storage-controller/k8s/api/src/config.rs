use crate::ResourceStatus;
use kube::{
    core::{NamespaceResourceScope, ObjectMeta},
    CustomResource,
};
use schemars::{
    gen::SchemaGenerator,
    schema::{InstanceType, Schema, SchemaObject},
    JsonSchema,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A custom resource whose spec is a free-form JSON object.
pub trait ConfigObject:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    fn from_parts(
        metadata: ObjectMeta,
        spec: Map<String, Value>,
        status: Option<ResourceStatus>,
    ) -> Self;

    fn spec_fields(&self) -> &Map<String, Value>;

    fn resource_status(&self) -> Option<&ResourceStatus>;
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "gloo.solo.io",
    version = "v1",
    kind = "Upstream",
    plural = "upstreams",
    shortname = "us",
    status = "ResourceStatus",
    derive = "PartialEq",
    namespaced
)]
pub struct UpstreamSpec {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "gloo.solo.io",
    version = "v1",
    kind = "VirtualService",
    plural = "virtualservices",
    shortname = "vs",
    status = "ResourceStatus",
    derive = "PartialEq",
    namespaced
)]
pub struct VirtualServiceSpec {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "gloo.solo.io",
    version = "v1",
    kind = "Role",
    plural = "roles",
    status = "ResourceStatus",
    derive = "PartialEq",
    namespaced
)]
pub struct RoleSpec {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "gloo.solo.io",
    version = "v1",
    kind = "Attribute",
    plural = "attributes",
    status = "ResourceStatus",
    derive = "PartialEq",
    namespaced
)]
pub struct AttributeSpec {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "gloo.solo.io",
    version = "v1",
    kind = "VirtualMesh",
    plural = "virtualmeshes",
    status = "ResourceStatus",
    derive = "PartialEq",
    namespaced
)]
pub struct VirtualMeshSpec {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

macro_rules! config_object {
    ($($obj:ident => $spec:ident),+ $(,)?) => {
        $(
            impl JsonSchema for $spec {
                fn schema_name() -> String {
                    stringify!($spec).to_owned()
                }

                fn is_referenceable() -> bool {
                    false
                }

                fn json_schema(_: &mut SchemaGenerator) -> Schema {
                    preserve_unknown_fields()
                }
            }

            impl ConfigObject for $obj {
                fn from_parts(
                    metadata: ObjectMeta,
                    spec: Map<String, Value>,
                    status: Option<ResourceStatus>,
                ) -> Self {
                    Self {
                        metadata,
                        spec: $spec { fields: spec },
                        status,
                    }
                }

                #[inline]
                fn spec_fields(&self) -> &Map<String, Value> {
                    &self.spec.fields
                }

                #[inline]
                fn resource_status(&self) -> Option<&ResourceStatus> {
                    self.status.as_ref()
                }
            }
        )+
    };
}

config_object! {
    Upstream => UpstreamSpec,
    VirtualService => VirtualServiceSpec,
    Role => RoleSpec,
    Attribute => AttributeSpec,
    VirtualMesh => VirtualMeshSpec,
}

/// An object schema that the API server stores verbatim.
fn preserve_unknown_fields() -> Schema {
    SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        extensions: [(
            "x-kubernetes-preserve-unknown-fields".to_owned(),
            Value::Bool(true),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    }
    .into()
}
