use gateway_storage_core::{Resource, Storage, Upstream};
use gateway_storage_file::FileStorage;
use std::time::Duration;

#[tokio::test]
async fn upstream_lifecycle() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path(), Duration::from_secs(1));
    storage.register().await.unwrap();
    let upstreams = storage.upstreams();

    let us = Upstream {
        name: "us1".to_string(),
        upstream_type: "static".to_string(),
        ..Upstream::default()
    };
    let created = upstreams.create(&us).await.unwrap();
    assert!(created.resource_version().is_some());

    // Without metadata the caller has not observed any version.
    let error = upstreams.update(&us).await.unwrap_err();
    assert!(error.is_validation(), "{error}");

    let mut changed = us.clone();
    changed.metadata = created.metadata.clone();
    changed.upstream_type = "static2".to_string();
    upstreams.update(&changed).await.unwrap();
    assert_eq!(upstreams.get("us1").await.unwrap().upstream_type, "static2");

    upstreams.delete("us1").await.unwrap();
    assert!(upstreams.get("us1").await.unwrap_err().is_not_found());
}
