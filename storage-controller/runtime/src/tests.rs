use crate::args::Args;
use clap::Parser;

#[test]
fn parses_file_backend() {
    let args = Args::try_parse_from(["gateway-storage", "file", "--root", "/etc/gateway"]).unwrap();
    let debug = format!("{args:?}");
    assert!(debug.contains("File"), "{debug}");
    assert!(debug.contains("sync_interval_ms: 1000"), "{debug}");
}

#[test]
fn parses_consul_backend() {
    let args = Args::try_parse_from([
        "gateway-storage",
        "--log-format",
        "json",
        "consul",
        "--address",
        "http://consul.service:8500",
        "--datacenter",
        "dc1",
        "--root",
        "gateway",
    ])
    .unwrap();
    let debug = format!("{args:?}");
    assert!(debug.contains("consul.service"), "{debug}");
    assert!(debug.contains("\"dc1\""), "{debug}");
}

#[test]
fn rejects_invalid_consul_address() {
    assert!(Args::try_parse_from(["gateway-storage", "consul", "--address", "not a url"]).is_err());
}

#[test]
fn requires_a_backend() {
    assert!(Args::try_parse_from(["gateway-storage"]).is_err());
    assert!(Args::try_parse_from(["gateway-storage", "file"]).is_err());
}

#[test]
fn parses_kube_backend() {
    let args = Args::try_parse_from(["gateway-storage", "kube", "--namespace", "edge"]).unwrap();
    let debug = format!("{args:?}");
    assert!(debug.contains("Kube"), "{debug}");
    assert!(debug.contains("\"edge\""), "{debug}");
}
