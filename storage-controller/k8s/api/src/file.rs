//! Files are stored as ConfigMaps in the storage namespace.
//!
//! ConfigMap names cannot contain `/`, so a ref is escaped into an object name: `-` becomes `--`
//! and `/` becomes `-s-`. The escaping is reversible, so two refs never share an object. The ref
//! itself is also kept in an annotation, which is authoritative.

use k8s_openapi::{api::core::v1::ConfigMap, ByteString};
use kube::core::ObjectMeta;
use std::collections::BTreeMap;

/// The `binaryData` key holding a file's contents.
pub const CONTENT_KEY: &str = "content";

/// Annotation recording the file ref a ConfigMap stores.
pub const REF_ANNOTATION: &str = "gloo.solo.io/file-ref";

/// Label selecting the ConfigMaps that hold files.
pub const KIND_LABEL: &str = "gloo.solo.io/kind";
pub const KIND_LABEL_VALUE: &str = "file";

/// Returns the label selector matching file ConfigMaps.
pub fn selector() -> String {
    format!("{KIND_LABEL}={KIND_LABEL_VALUE}")
}

/// Maps a file ref to the name of the ConfigMap storing it.
pub fn object_name(file_ref: &str) -> String {
    let mut name = String::with_capacity(file_ref.len());
    for c in file_ref.chars() {
        match c {
            '-' => name.push_str("--"),
            '/' => name.push_str("-s-"),
            c => name.push(c),
        }
    }
    name
}

/// Recovers the file ref from a ConfigMap name produced by [`object_name`].
///
/// Names that were not escaped (e.g. created by hand) are returned mostly as-is: a lone `-` is
/// kept.
pub fn ref_of(object_name: &str) -> String {
    let mut file_ref = String::with_capacity(object_name.len());
    let mut rest = object_name;
    while let Some(i) = rest.find('-') {
        file_ref.push_str(&rest[..i]);
        rest = &rest[i..];
        if let Some(r) = rest.strip_prefix("--") {
            file_ref.push('-');
            rest = r;
        } else if let Some(r) = rest.strip_prefix("-s-") {
            file_ref.push('/');
            rest = r;
        } else {
            file_ref.push('-');
            rest = &rest[1..];
        }
    }
    file_ref.push_str(rest);
    file_ref
}

/// Builds the ConfigMap storing `contents` under `file_ref`.
///
/// `metadata` is used as the base of the object's metadata, so callers can carry a resource
/// version or labels through.
pub fn to_config_map(file_ref: &str, contents: Vec<u8>, mut metadata: ObjectMeta) -> ConfigMap {
    metadata.name = Some(object_name(file_ref));
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(KIND_LABEL.to_string(), KIND_LABEL_VALUE.to_string());
    metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(REF_ANNOTATION.to_string(), file_ref.to_string());
    ConfigMap {
        metadata,
        binary_data: Some(BTreeMap::from([(
            CONTENT_KEY.to_string(),
            ByteString(contents),
        )])),
        ..ConfigMap::default()
    }
}

/// Returns the file ref stored by `cm`.
pub fn file_ref(cm: &ConfigMap) -> Option<String> {
    if let Some(file_ref) = cm.metadata.annotations.as_ref().and_then(|a| a.get(REF_ANNOTATION)) {
        return Some(file_ref.clone());
    }
    cm.metadata.name.as_deref().map(ref_of)
}

/// Returns the file contents stored by `cm`.
///
/// ConfigMaps edited by hand may carry the contents as text under `data`.
pub fn contents(cm: &ConfigMap) -> Vec<u8> {
    if let Some(ByteString(bytes)) = cm.binary_data.as_ref().and_then(|d| d.get(CONTENT_KEY)) {
        return bytes.clone();
    }
    cm.data
        .as_ref()
        .and_then(|d| d.get(CONTENT_KEY))
        .map(|s| s.as_bytes().to_vec())
        .unwrap_or_default()
}
