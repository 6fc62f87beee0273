use std::fs;

use podflux_core::config::AppConfig;
use podflux_core::transport::{
    ConfiguredConnector, Connector, LocalDirectory, RemoteDestination, RemoteSource,
    TransportError,
};
use tempfile::tempdir;

#[test]
fn local_directory_lists_pods_and_files() {
    let root = tempdir().expect("tempdir");
    fs::create_dir(root.path().join("POD-B")).expect("mkdir");
    fs::create_dir(root.path().join("POD-A")).expect("mkdir");
    fs::write(root.path().join("stray.csv"), "x").expect("write");
    fs::write(root.path().join("POD-A").join("export_20240303.csv"), "a;b").expect("write");
    fs::create_dir(root.path().join("POD-A").join("archive")).expect("mkdir");

    let source = LocalDirectory::new(root.path());

    assert_eq!(source.list_dirs().expect("dirs"), vec!["POD-A", "POD-B"]);

    let files = source.list_files("POD-A").expect("files");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "export_20240303.csv");
    assert!(files[0].modified.is_some());
    assert!(source.list_files("POD-B").expect("files").is_empty());

    let bytes = source.read("POD-A", "export_20240303.csv").expect("read");
    assert_eq!(bytes, b"a;b");
}

#[test]
fn local_directory_reports_missing_paths() {
    let root = tempdir().expect("tempdir");
    let source = LocalDirectory::new(root.path());

    let err = source.read("POD-A", "nothing.csv").expect_err("missing file");
    assert!(matches!(err, TransportError::NotFound(_)));

    let err = source.list_files("POD-A").expect_err("missing dir");
    assert!(matches!(err, TransportError::NotFound(_)));
}

#[test]
fn local_destination_writes_flat_files() {
    let root = tempdir().expect("tempdir");
    let target = root.path().join("outbox");
    let mut destination = LocalDirectory::new(&target);

    destination
        .write("POD-A-2024-03-03.json", b"{}")
        .expect("write");

    let written = fs::read(target.join("POD-A-2024-03-03.json")).expect("read back");
    assert_eq!(written, b"{}");
}

fn connector_config(source_root: &str, target_root: &str) -> AppConfig {
    let raw = format!(
        r#"
[source]
remote = "inbox"
destination = "outbox"

[remotes.inbox]
protocol = "local"
root = "{source_root}"

[remotes.outbox]
protocol = "local"
root = "{target_root}"

[remotes.upstream]
protocol = "sftp"
host = "sftp.example.net"
username = "reader"
password = "hunter2"
"#
    );
    AppConfig::from_toml_str(&raw).expect("valid config")
}

#[test]
fn configured_connector_opens_local_remotes() {
    let source_root = tempdir().expect("tempdir");
    let target_root = tempdir().expect("tempdir");
    fs::create_dir(source_root.path().join("POD-A")).expect("mkdir");

    let config = connector_config(
        &source_root.path().display().to_string(),
        &target_root.path().display().to_string(),
    );
    let connector = ConfiguredConnector::new(&config);

    let source = connector.open_source("inbox").expect("open source");
    assert_eq!(source.list_dirs().expect("dirs"), vec!["POD-A"]);

    let mut destination = connector.open_destination("outbox").expect("open destination");
    destination.write("out.json", b"[]").expect("write");
    assert!(target_root.path().join("out.json").exists());

    let err = connector.open_source("nowhere").err().expect("unknown remote");
    assert!(matches!(err, TransportError::Unsupported { .. }));
}

#[cfg(not(feature = "sftp"))]
#[test]
fn sftp_remotes_need_the_sftp_feature() {
    let source_root = tempdir().expect("tempdir");
    let config = connector_config(
        &source_root.path().display().to_string(),
        &source_root.path().display().to_string(),
    );
    let connector = ConfiguredConnector::new(&config);

    let err = connector.open_source("upstream").err().expect("sftp disabled");
    let message = err.to_string();
    assert!(message.contains("sftp"));
    assert!(!message.contains("hunter2"));
}
