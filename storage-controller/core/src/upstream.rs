use crate::{Metadata, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A destination the proxy can route to, e.g. a static host list or a discovered service.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub name: String,

    /// Selects the plugin that interprets `spec`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub upstream_type: String,

    /// A duration string such as `5s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Function>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_info: Option<ServiceInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// A callable function exposed by an upstream (a lambda, a REST operation, ...).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}
