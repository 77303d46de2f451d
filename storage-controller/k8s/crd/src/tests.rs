use super::*;
use crate::{client::status_code, resource::KubeResource};
use futures::{stream, StreamExt};
use gateway_storage_core::{
    CancellationToken, EventHandlerFuncs, Handlers, Kind, Resource, SharedHandler, State, Status,
};
use gateway_storage_k8s_api::{file, ConfigObject, ResourceExt, ResourceStatus};
use kube::{
    core::ErrorResponse,
    runtime::watcher::{self, Event},
};
use maplit::btreemap;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

fn mk_upstream(name: &str) -> Upstream {
    Upstream {
        name: name.to_string(),
        upstream_type: "static".to_string(),
        connection_timeout: Some("5s".to_string()),
        spec: Some(json!({ "hosts": [{ "addr": "10.0.0.1", "port": 8080 }] })),
        ..Upstream::default()
    }
}

fn mk_object(name: &str, version: &str) -> api::Upstream {
    let mut obj = mk_upstream(name)
        .to_object(ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("gloo-system".to_string()),
            ..ObjectMeta::default()
        })
        .unwrap();
    obj.metadata.resource_version = Some(version.to_string());
    obj
}

fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "nope".to_string(),
        reason: "Conflict".to_string(),
        code,
    })
}

#[test]
fn upstream_spec_omits_storage_fields() {
    let mut us = mk_upstream("us1");
    us.status = Some(Status {
        state: State::Rejected,
        reason: "bad port".to_string(),
    });
    us.metadata_mut()
        .annotations
        .insert("owner".to_string(), "team-a".to_string());
    us.set_resource_version("41".to_string());

    let obj = us
        .to_object(ObjectMeta {
            name: Some("us1".to_string()),
            ..ObjectMeta::default()
        })
        .unwrap();
    assert_eq!(
        serde_json::Value::Object(obj.spec_fields().clone()),
        json!({
            "type": "static",
            "connectionTimeout": "5s",
            "spec": { "hosts": [{ "addr": "10.0.0.1", "port": 8080 }] },
        })
    );
    assert_eq!(
        obj.resource_status(),
        Some(&ResourceStatus {
            state: Some("Rejected".to_string()),
            reason: Some("bad port".to_string()),
        })
    );
}

#[test]
fn upstream_from_object() {
    let mut obj = mk_object("us1", "1234");
    obj.metadata.annotations = Some(btreemap! {
        "owner".to_string() => "team-a".to_string(),
    });
    obj.status = Some(ResourceStatus {
        state: Some("Accepted".to_string()),
        reason: None,
    });

    let us = Upstream::from_object(&obj).unwrap();
    assert_eq!(us.name, "us1");
    assert_eq!(us.upstream_type, "static");
    assert_eq!(us.connection_timeout.as_deref(), Some("5s"));
    assert_eq!(us.resource_version(), Some("1234"));
    assert_eq!(us.status.as_ref().map(|s| s.state), Some(State::Accepted));
    let meta = us.metadata.unwrap();
    assert_eq!(meta.namespace, "gloo-system");
    assert_eq!(meta.annotations.get("owner").map(String::as_str), Some("team-a"));
}

#[test]
fn files_are_config_maps() {
    let mut f = File::new("certs/ca.pem", b"PEM".to_vec());
    f.metadata_mut()
        .annotations
        .insert("owner".to_string(), "team-a".to_string());
    let annotations = f.metadata.as_ref().map(|m| m.annotations.clone());

    let mut cm = f
        .to_object(ObjectMeta {
            name: Some(File::object_name("certs/ca.pem")),
            annotations,
            ..ObjectMeta::default()
        })
        .unwrap();
    assert_eq!(cm.name_any(), "certs-s-ca.pem");
    cm.metadata.resource_version = Some("7".to_string());

    let decoded = File::from_object(&cm).unwrap();
    assert_eq!(decoded.file_ref, "certs/ca.pem");
    assert_eq!(decoded.contents, b"PEM".to_vec());
    assert_eq!(decoded.resource_version(), Some("7"));
    let annotations = decoded.metadata.unwrap().annotations;
    assert!(!annotations.contains_key(file::REF_ANNOTATION));
    assert_eq!(annotations.get("owner").map(String::as_str), Some("team-a"));

    assert_eq!(File::label_selector(), Some(file::selector()));
    assert_eq!(Upstream::label_selector(), None);
}

#[test]
fn object_names_are_dns_subdomains() {
    for name in ["us1", "my-upstream", "a.b.c", "0"] {
        assert!(validate_object_name(Kind::Upstream, name).is_ok(), "{name}");
    }
    for name in ["", "Upper", "under_score", "-leading", "trailing-", "a/b", "a..b"] {
        let error = validate_object_name(Kind::Upstream, name).unwrap_err();
        assert!(error.is_validation(), "{name}: {error}");
    }
    assert!(validate_object_name(Kind::Upstream, &"a".repeat(254)).is_err());

    assert!(validate_object_name(Kind::File, "certs/ca.pem").is_ok());
    assert!(validate_object_name(Kind::File, "certs/CA.pem").is_err());
    assert!(validate_object_name(Kind::File, "../ca.pem").is_err());
}

#[test]
fn api_error_codes() {
    assert_eq!(status_code(&api_error(409)), Some(409));
    assert_eq!(status_code(&api_error(404)), Some(404));
    let decode = serde_json::from_str::<u8>("x").unwrap_err();
    assert_eq!(status_code(&kube::Error::SerdeError(decode)), None);
}

#[derive(Debug, PartialEq, Eq)]
enum Notification {
    Add(Vec<String>, Option<String>),
    Update(Vec<String>, Option<String>),
    Delete(Vec<String>, Option<String>),
}

fn recorder() -> (
    Handlers<Upstream>,
    mpsc::UnboundedReceiver<Notification>,
) {
    fn names(items: &[Upstream]) -> Vec<String> {
        items.iter().map(|u| u.name.clone()).collect()
    }
    fn name(item: Option<&Upstream>) -> Option<String> {
        item.map(|u| u.name.clone())
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let (add, update, delete) = (tx.clone(), tx.clone(), tx);
    let handler = EventHandlerFuncs::<Upstream>::new()
        .with_add(move |items, item| {
            let _ = add.send(Notification::Add(names(items), name(item)));
        })
        .with_update(move |items, item| {
            let _ = update.send(Notification::Update(names(items), name(item)));
        })
        .with_delete(move |items, item| {
            let _ = delete.send(Notification::Delete(names(items), name(item)));
        });
    let handlers = Handlers::from(vec![Arc::new(handler) as SharedHandler<Upstream>]);
    (handlers, rx)
}

fn s(v: &str) -> String {
    v.to_string()
}

#[tokio::test(start_paused = true)]
async fn watch_tracks_objects() {
    let (handlers, mut rx) = recorder();
    let events = stream::iter(vec![
        Ok(Event::Restarted(vec![mk_object("a", "1")])),
        Ok(Event::Applied(mk_object("b", "2"))),
        Ok(Event::Applied(mk_object("b", "3"))),
        Err(watcher::Error::WatchError(ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version".to_string(),
            reason: "Expired".to_string(),
            code: 410,
        })),
        Ok(Event::Deleted(mk_object("a", "1"))),
        Ok(Event::Deleted(mk_object("zzz", "1"))),
    ])
    .chain(stream::pending());

    let stop = CancellationToken::new();
    let task = tokio::spawn(watch::run::<Upstream, _>(events, handlers, stop.clone()));

    assert_eq!(
        rx.recv().await.unwrap(),
        Notification::Add(vec![s("a")], None)
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        Notification::Add(vec![s("a"), s("b")], Some(s("b")))
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        Notification::Update(vec![s("a"), s("b")], Some(s("b")))
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        Notification::Delete(vec![s("b")], Some(s("a")))
    );

    stop.cancel();
    task.await.unwrap().unwrap();
    assert!(rx.try_recv().is_err(), "unknown deletions are ignored");
}

#[tokio::test]
async fn watch_fails_if_initial_list_fails() {
    let (handlers, _rx) = recorder();
    let events = stream::iter(vec![Err(watcher::Error::InitialListFailed(api_error(403)))]);
    let error = watch::run::<Upstream, _>(events, handlers, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(error.to_string().contains("failed to list upstreams"), "{error}");
}

#[tokio::test]
async fn watch_fails_if_stream_ends() {
    let (handlers, mut rx) = recorder();
    let events = stream::iter(vec![Ok(Event::Restarted(vec![]))]);
    let res = watch::run::<Upstream, _>(events, handlers, CancellationToken::new()).await;
    assert!(res.is_err());
    assert_eq!(rx.recv().await.unwrap(), Notification::Add(vec![], None));
}

#[tokio::test]
async fn watch_skips_undecodable_objects() {
    let (handlers, mut rx) = recorder();
    let mut broken = mk_object("broken", "1");
    broken.spec.fields.insert("type".to_string(), json!(42));
    let events = stream::iter(vec![Ok(Event::Restarted(vec![
        mk_object("a", "1"),
        broken,
    ]))])
    .chain(stream::pending());

    let stop = CancellationToken::new();
    let task = tokio::spawn(watch::run::<Upstream, _>(events, handlers, stop.clone()));
    assert_eq!(
        rx.recv().await.unwrap(),
        Notification::Add(vec![s("a")], None)
    );
    stop.cancel();
    task.await.unwrap().unwrap();
}
