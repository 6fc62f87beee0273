use podflux_core::config::{AppConfig, LogRotation, Protocol, RemoteConfig, Secret};
use podflux_core::error::PipelineError;
use podflux_core::feed::FeedKind;

const SAMPLE: &str = r#"
[interval]
timezone = "Europe/Budapest"
minutes = 5

[schedule]
misfire_grace_secs = 10

[logging]
level = "podflux=debug,info"
directory = "/var/log/podflux"
rotation = "hourly"

[source]
remote = "inverters"
destination = "grid"

[[pods]]
id = "HU000120F11-S1"
feed = { kind = "hub" }

[[pods]]
id = "HU000120F11-S2"
destination = "archive"

[remotes.inverters]
protocol = "sftp"
host = "sftp.example.net"
username = "reader"
password = "hunter2"
known_hosts = "/etc/podflux/known_hosts"

[remotes.grid]
protocol = "sftp"
host = "upload.example.net"
port = 2222
username = "writer"
password = "correct-horse"
known_hosts = "/etc/podflux/known_hosts"

[remotes.archive]
protocol = "local"
root = "/var/lib/podflux/archive"
"#;

fn with_section(extra: &str) -> String {
    format!("{SAMPLE}\n{extra}")
}

#[test]
fn sample_configuration_parses() {
    let config = AppConfig::from_toml_str(SAMPLE).expect("valid config");

    assert_eq!(config.interval.minutes, 5);
    assert_eq!(config.interval.timezone, chrono_tz::Europe::Budapest);
    assert_eq!(config.schedule.misfire_grace_secs, 10);
    assert_eq!(config.logging.rotation, LogRotation::Hourly);
    assert_eq!(config.logging.max_files, 10);
    assert_eq!(config.pods.len(), 2);
    assert_eq!(config.source.filename_patterns, vec!["*%Y%m%d*", "*%Y-%m-%d*"]);

    let grid = config.remote("grid").expect("grid remote");
    assert_eq!(grid.protocol, Protocol::Sftp);
    assert_eq!(grid.port, 2222);
    assert_eq!(config.remote("inverters").expect("inverters").port, 22);
}

#[test]
fn pods_route_to_their_feed_and_destination() {
    let config = AppConfig::from_toml_str(SAMPLE).expect("valid config");

    let (feed, destination) = config.route("HU000120F11-S1");
    assert!(matches!(feed, FeedKind::Hub { format: None }));
    assert_eq!(destination, "grid");

    let (feed, destination) = config.route("HU000120F11-S2");
    assert_eq!(*feed, FeedKind::default());
    assert_eq!(destination, "archive");

    let (feed, destination) = config.route("UNREGISTERED");
    assert!(matches!(feed, FeedKind::Datalogger { .. }));
    assert_eq!(destination, "grid");
}

#[test]
fn secrets_never_print() {
    let config = AppConfig::from_toml_str(SAMPLE).expect("valid config");
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("correct-horse"));

    let password = config
        .remote("inverters")
        .and_then(|remote| remote.resolve_password("inverters"))
        .expect("inline password");
    assert_eq!(password.to_string(), "**********");
    assert_eq!(format!("{password:?}"), "**********");
    assert_eq!(password.expose(), "hunter2");
}

#[test]
fn password_can_come_from_the_environment() {
    let remote: RemoteConfig = toml::from_str(
        r#"
protocol = "sftp"
host = "upload.example.net"
username = "writer"
password_env = "PODFLUX_TEST_ENV_PASSWORD"
"#,
    )
    .expect("remote");

    std::env::set_var("PODFLUX_TEST_ENV_PASSWORD", "from-env");
    let password = remote.resolve_password("grid").expect("env password");
    assert_eq!(password, Secret::new("from-env"));

    std::env::remove_var("PODFLUX_TEST_ENV_PASSWORD");
    let err = remote.resolve_password("grid").expect_err("unset variable");
    let message = err.to_string();
    assert!(message.contains("PODFLUX_TEST_ENV_PASSWORD"));
    assert!(!message.contains("from-env"));
}

#[test]
fn interval_must_divide_an_hour() {
    let raw = SAMPLE.replace("minutes = 5", "minutes = 7");
    let err = AppConfig::from_toml_str(&raw).expect_err("7 minutes");
    assert!(matches!(err, PipelineError::Config(_)));

    let raw = SAMPLE.replace("minutes = 5", "minutes = 0");
    assert!(AppConfig::from_toml_str(&raw).is_err());
}

#[test]
fn duplicate_pods_are_rejected() {
    let raw = with_section("[[pods]]\nid = \"HU000120F11-S1\"\n");
    let err = AppConfig::from_toml_str(&raw).expect_err("duplicate");
    assert!(err.to_string().contains("duplicate POD id"));
}

#[test]
fn unknown_remotes_are_rejected() {
    let raw = with_section("[[pods]]\nid = \"HU000120F11-S3\"\ndestination = \"nowhere\"\n");
    let err = AppConfig::from_toml_str(&raw).expect_err("unknown remote");
    assert!(err.to_string().contains("nowhere"));

    let raw = SAMPLE.replace("remote = \"inverters\"", "remote = \"missing\"");
    assert!(AppConfig::from_toml_str(&raw).is_err());
}

#[test]
fn sftp_remote_without_credentials_is_rejected() {
    let raw = SAMPLE.replace("password = \"hunter2\"\n", "");
    let err = AppConfig::from_toml_str(&raw).expect_err("no password");
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(err.to_string().contains("inverters"));
}

#[test]
fn invalid_filename_pattern_is_rejected() {
    let raw = SAMPLE.replace(
        "destination = \"grid\"\n",
        "destination = \"grid\"\nfilename_patterns = [\"*%Q*\"]\n",
    );
    assert!(AppConfig::from_toml_str(&raw).is_err());
}

#[test]
fn format_records_override_defaults_field_by_field() {
    let raw = with_section(
        "[formats.datalogger]\ndelimiter = \",\"\nenergy_column = \"Yield\"\n\n[formats.hub]\nexpected_rows = 15\n",
    );
    let config = AppConfig::from_toml_str(&raw).expect("valid config");

    assert_eq!(config.formats.datalogger.delimiter, ',');
    assert_eq!(config.formats.datalogger.energy_column, "Yield");
    assert_eq!(config.formats.datalogger.timestamp_column, "#Time");
    assert_eq!(config.formats.hub.expected_rows, 15);
    assert_eq!(config.formats.hub.shift_minutes, 1);
}

#[test]
fn pod_feed_can_carry_its_own_format() {
    let raw = with_section(
        "[[pods]]\nid = \"HU000120F11-S4\"\n\n[pods.feed]\nkind = \"datalogger\"\n\n[pods.feed.format]\nenergy_column = \"E-Total\"\n",
    );
    let config = AppConfig::from_toml_str(&raw).expect("valid config");

    let (feed, _) = config.route("HU000120F11-S4");
    match feed {
        FeedKind::Datalogger {
            format: Some(format),
        } => {
            assert_eq!(format.energy_column, "E-Total");
            assert_eq!(format.delimiter, ';');
        }
        other => panic!("unexpected feed {other:?}"),
    }
}
