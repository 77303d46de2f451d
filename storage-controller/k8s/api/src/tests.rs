use super::*;
use serde_json::{json, Map, Value};

#[test]
fn crds_share_group_and_version() {
    let crds = crds();
    let names = crds
        .iter()
        .map(|crd| crd.metadata.name.clone().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "upstreams.gloo.solo.io",
            "virtualservices.gloo.solo.io",
            "roles.gloo.solo.io",
            "attributes.gloo.solo.io",
            "virtualmeshes.gloo.solo.io",
        ]
    );
    for crd in &crds {
        assert_eq!(crd.spec.group, GROUP);
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions.len(), 1);
        assert_eq!(crd.spec.versions[0].name, VERSION);
    }
}

#[test]
fn crd_spec_preserves_unknown_fields() {
    let crd = serde_json::to_value(Upstream::crd()).unwrap();
    let version = &crd["spec"]["versions"][0];
    assert_eq!(
        version
            .pointer("/schema/openAPIV3Schema/properties/spec/x-kubernetes-preserve-unknown-fields"),
        Some(&Value::Bool(true)),
        "{version:#}"
    );
    assert!(
        version.pointer("/subresources/status").is_some(),
        "{version:#}"
    );
}

#[test]
fn spec_fields_serialize_inline() {
    let mut spec = Map::new();
    spec.insert("type".to_string(), json!("static"));
    spec.insert("connectionTimeout".to_string(), json!("5s"));
    let us = Upstream::from_parts(
        ObjectMeta {
            name: Some("us1".to_string()),
            namespace: Some("gloo-system".to_string()),
            ..ObjectMeta::default()
        },
        spec.clone(),
        Some(ResourceStatus {
            state: Some("Accepted".to_string()),
            reason: None,
        }),
    );

    let value = serde_json::to_value(&us).unwrap();
    assert_eq!(value["apiVersion"], "gloo.solo.io/v1");
    assert_eq!(value["kind"], "Upstream");
    assert_eq!(value["spec"], json!({ "type": "static", "connectionTimeout": "5s" }));
    assert_eq!(value["status"], json!({ "state": "Accepted" }));

    let parsed = serde_json::from_value::<Upstream>(value).unwrap();
    assert_eq!(parsed.spec_fields(), &spec);
    assert_eq!(parsed.name_any(), "us1");
    assert_eq!(parsed, us);
}

#[test]
fn file_config_maps() {
    let cm = file::to_config_map("certs/ca.pem", b"PEM".to_vec(), ObjectMeta::default());
    assert_eq!(cm.metadata.name.as_deref(), Some("certs-s-ca.pem"));
    assert_eq!(file::file_ref(&cm).as_deref(), Some("certs/ca.pem"));
    assert_eq!(file::contents(&cm), b"PEM".to_vec());
    assert_eq!(
        cm.metadata.labels.as_ref().unwrap().get(file::KIND_LABEL).map(String::as_str),
        Some(file::KIND_LABEL_VALUE)
    );
    assert_eq!(file::selector(), "gloo.solo.io/kind=file");
}

#[test]
fn distinct_file_refs_get_distinct_names() {
    let refs = [
        "certs/ca.pem",
        "certs.ca.pem",
        "certs-s-ca.pem",
        "certs--ca.pem",
        "a-b/c",
        "a/b-c",
        "a-s-b",
    ];
    let names = refs.iter().map(|r| file::object_name(r)).collect::<Vec<_>>();
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            assert_ne!(a, b);
        }
    }
    for (file_ref, name) in refs.iter().zip(&names) {
        assert_eq!(&file::ref_of(name), file_ref, "{name}");
    }
}

#[test]
fn unescaped_names_are_kept() {
    assert_eq!(file::ref_of("motd"), "motd");
    assert_eq!(file::ref_of("a-b.txt"), "a-b.txt");
}

#[test]
fn file_config_map_with_text_data() {
    let cm = ConfigMap {
        metadata: ObjectMeta {
            name: Some("motd".to_string()),
            ..ObjectMeta::default()
        },
        data: Some([(file::CONTENT_KEY.to_string(), "hello".to_string())].into()),
        ..ConfigMap::default()
    };
    assert_eq!(file::file_ref(&cm).as_deref(), Some("motd"));
    assert_eq!(file::contents(&cm), b"hello".to_vec());
}
