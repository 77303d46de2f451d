use gateway_storage_core::{
    Error, File, Resource, ResourceClient, State, Status, Storage, Upstream,
};
use gateway_storage_k8s::KubeStorage;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::{
    matchers::{any, body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

const UPSTREAMS: &str = "/apis/gloo.solo.io/v1/namespaces/gloo-system/upstreams";
const CONFIG_MAPS: &str = "/api/v1/namespaces/gloo-system/configmaps";

fn mk_storage(server: &MockServer) -> KubeStorage {
    let config = kube::Config::new(server.uri().parse().unwrap());
    let client = kube::Client::try_from(config).unwrap();
    KubeStorage::new(client, "gloo-system", Duration::from_secs(30))
}

fn mk_upstream(name: &str) -> Upstream {
    Upstream {
        name: name.to_string(),
        upstream_type: "static".to_string(),
        ..Upstream::default()
    }
}

fn upstream_object(name: &str, version: &str, labels: Value) -> Value {
    json!({
        "apiVersion": "gloo.solo.io/v1",
        "kind": "Upstream",
        "metadata": {
            "name": name,
            "namespace": "gloo-system",
            "resourceVersion": version,
            "labels": labels,
        },
        "spec": { "type": "static" },
    })
}

fn status(code: u16, reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("{reason} ({code})"),
        "reason": reason,
        "code": code,
    }))
}

#[tokio::test]
async fn create_returns_stored_version() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSTREAMS))
        .and(body_partial_json(json!({
            "metadata": { "name": "us1", "namespace": "gloo-system" },
            "spec": { "type": "static" },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(upstream_object("us1", "5", json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    let created = mk_storage(&server).upstreams().create(&mk_upstream("us1")).await.unwrap();
    assert_eq!(created.name, "us1");
    assert_eq!(created.resource_version(), Some("5"));
}

#[tokio::test]
async fn create_collision_is_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSTREAMS))
        .respond_with(status(409, "AlreadyExists"))
        .mount(&server)
        .await;

    let error = mk_storage(&server)
        .upstreams()
        .create(&mk_upstream("us1"))
        .await
        .unwrap_err();
    assert!(error.is_already_exists(), "{error}");
}

#[tokio::test]
async fn create_writes_status_separately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPSTREAMS))
        .respond_with(ResponseTemplate::new(201).set_body_json(upstream_object("us1", "1", json!({}))))
        .expect(1)
        .mount(&server)
        .await;
    let mut with_status = upstream_object("us1", "2", json!({}));
    with_status["status"] = json!({ "state": "Accepted" });
    Mock::given(method("PUT"))
        .and(path(format!("{UPSTREAMS}/us1/status")))
        .and(body_partial_json(json!({
            "metadata": { "resourceVersion": "1" },
            "status": { "state": "Accepted" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(with_status))
        .expect(1)
        .mount(&server)
        .await;

    let mut us = mk_upstream("us1");
    us.status = Some(Status {
        state: State::Accepted,
        reason: String::new(),
    });
    let created = mk_storage(&server).upstreams().create(&us).await.unwrap();
    assert_eq!(created.resource_version(), Some("2"));
    assert_eq!(created.status.map(|s| s.state), Some(State::Accepted));
}

#[tokio::test]
async fn update_keeps_labels_of_the_stored_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{UPSTREAMS}/us1")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(upstream_object("us1", "7", json!({ "team": "a" }))),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{UPSTREAMS}/us1")))
        .and(body_partial_json(json!({
            "metadata": { "resourceVersion": "7", "labels": { "team": "a" } },
            "spec": { "type": "static", "connectionTimeout": "1s" },
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(upstream_object("us1", "8", json!({ "team": "a" }))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut us = mk_upstream("us1");
    us.connection_timeout = Some("1s".to_string());
    us.set_resource_version("7".to_string());
    let updated = mk_storage(&server).upstreams().update(&us).await.unwrap();
    assert_eq!(updated.resource_version(), Some("8"));
}

#[tokio::test]
async fn stale_update_is_a_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{UPSTREAMS}/us1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_object("us1", "9", json!({}))))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{UPSTREAMS}/us1")))
        .respond_with(status(409, "Conflict"))
        .mount(&server)
        .await;

    let mut us = mk_upstream("us1");
    us.set_resource_version("8".to_string());
    match mk_storage(&server).upstreams().update(&us).await {
        Err(Error::VersionConflict {
            provided, current, ..
        }) => {
            assert_eq!(provided, "8");
            assert_eq!(current.as_deref(), Some("9"));
        }
        res => panic!("expected a version conflict, got {res:?}"),
    }
}

#[tokio::test]
async fn update_of_missing_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{UPSTREAMS}/us1")))
        .respond_with(status(404, "NotFound"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut us = mk_upstream("us1");
    us.set_resource_version("3".to_string());
    let error = mk_storage(&server).upstreams().update(&us).await.unwrap_err();
    assert!(error.is_not_found(), "{error}");
}

#[tokio::test]
async fn update_without_version_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let error = mk_storage(&server)
        .upstreams()
        .update(&mk_upstream("us1"))
        .await
        .unwrap_err();
    assert!(error.is_validation(), "{error}");
}

#[tokio::test]
async fn get_and_delete_of_missing_objects_are_not_found() {
    let server = MockServer::start().await;
    Mock::given(any())
        .and(path(format!("{UPSTREAMS}/us1")))
        .respond_with(status(404, "NotFound"))
        .mount(&server)
        .await;

    let storage = mk_storage(&server);
    let error = storage.upstreams().get("us1").await.unwrap_err();
    assert!(error.is_not_found(), "{error}");
    let error = storage.upstreams().delete("us1").await.unwrap_err();
    assert!(error.is_not_found(), "{error}");
}

#[tokio::test]
async fn file_refs_that_differ_only_by_separator_are_distinct_objects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{CONFIG_MAPS}/certs-s-ca.pem")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "certs-s-ca.pem",
                "namespace": "gloo-system",
                "resourceVersion": "4",
                "labels": { "gloo.solo.io/kind": "file" },
                "annotations": { "gloo.solo.io/file-ref": "certs/ca.pem" },
            },
            "binaryData": { "content": "UEVN" },
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{CONFIG_MAPS}/certs.ca.pem")))
        .respond_with(status(404, "NotFound"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CONFIG_MAPS))
        .and(body_partial_json(json!({
            "metadata": {
                "name": "certs.ca.pem",
                "annotations": { "gloo.solo.io/file-ref": "certs.ca.pem" },
            },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "certs.ca.pem",
                "namespace": "gloo-system",
                "resourceVersion": "5",
                "labels": { "gloo.solo.io/kind": "file" },
                "annotations": { "gloo.solo.io/file-ref": "certs.ca.pem" },
            },
            "binaryData": { "content": "S0VZ" },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = mk_storage(&server);
    let nested = storage.files().get("certs/ca.pem").await.unwrap();
    assert_eq!(nested.file_ref, "certs/ca.pem");
    assert_eq!(nested.contents, b"PEM".to_vec());

    let error = storage.files().get("certs.ca.pem").await.unwrap_err();
    assert!(error.is_not_found(), "{error}");

    let flat = storage
        .files()
        .create(&File::new("certs.ca.pem", b"KEY".to_vec()))
        .await
        .unwrap();
    assert_eq!(flat.file_ref, "certs.ca.pem");
    assert_eq!(flat.contents, b"KEY".to_vec());
}

#[tokio::test]
async fn register_leaves_existing_namespace_and_definitions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces"))
        .and(body_partial_json(json!({ "metadata": { "name": "gloo-system" } })))
        .respond_with(status(409, "AlreadyExists"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apis/apiextensions.k8s.io/v1/customresourcedefinitions"))
        .respond_with(status(409, "AlreadyExists"))
        .expect(5)
        .mount(&server)
        .await;

    mk_storage(&server).register().await.unwrap();
}

#[tokio::test]
async fn register_fails_when_forbidden() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces"))
        .respond_with(status(403, "Forbidden"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apis/apiextensions.k8s.io/v1/customresourcedefinitions"))
        .respond_with(status(409, "AlreadyExists"))
        .expect(0)
        .mount(&server)
        .await;

    let error = mk_storage(&server).register().await.unwrap_err();
    assert!(error.to_string().contains("gloo-system"), "{error}");
}
