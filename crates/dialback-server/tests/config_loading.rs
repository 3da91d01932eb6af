use dialback_server::config::{load_config, Config, ConfigError, LoggingConfig};
use dialback_server::StartupError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_sections_from_file() {
    let file = write_config(
        r#"
        [dialback]
        require_encryption = true

        [hosts."a.example"]
        secret = "s3cret"

        [logging]
        level = "dialback_core=debug,info"

        [auth]
        allow_anonymous = true
        "#,
    );

    let config = load_config(file.path().to_str()).unwrap();

    assert!(config.dialback.require_encryption);
    assert!(!config.dialback.strict_interop);
    assert_eq!(config.logging.level, "dialback_core=debug,info");
    assert!(!config.logging.json);
    assert!(config.auth.allow_anonymous);
    assert_eq!(config.hosts["a.example"].secret.as_ref().unwrap().expose(), "s3cret");
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config = load_config(path.to_str()).unwrap();

    assert!(config.hosts.is_empty());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("[dialback\nrequire_encryption = maybe");
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "{err}");
}

#[test]
fn host_names_are_normalized() {
    let config: Config = toml::from_str(
        r#"
        [hosts."A.Example."]
        secret = "one"
        "#,
    )
    .unwrap();

    let secrets = config.host_secrets().unwrap();
    assert_eq!(secrets.get("a.example").map(String::as_str), Some("one"));
}

#[test]
fn hosts_without_secret_get_a_random_one() {
    let config: Config = toml::from_str(
        r#"
        [hosts."a.example"]
        [hosts."b.example"]
        "#,
    )
    .unwrap();

    let first = config.host_secrets().unwrap();
    let second = config.host_secrets().unwrap();

    assert_eq!(first["a.example"].len(), 32);
    assert_ne!(first["a.example"], first["b.example"]);
    assert_ne!(first["a.example"], second["a.example"]);
}

#[test]
fn colliding_hosts_are_rejected() {
    let config: Config = toml::from_str(
        r#"
        [hosts."a.example"]
        [hosts."A.EXAMPLE"]
        "#,
    )
    .unwrap();
    assert!(matches!(
        config.host_secrets(),
        Err(ConfigError::DuplicateHost(d)) if d == "a.example"
    ));
}

#[test]
fn invalid_host_is_rejected() {
    let config: Config = toml::from_str(
        r#"
        [hosts."not a domain"]
        "#,
    )
    .unwrap();
    assert!(matches!(
        config.host_secrets(),
        Err(ConfigError::InvalidHost { .. })
    ));
}

#[tokio::test]
async fn start_wires_providers_and_runtime() {
    let config: Config = toml::from_str(
        r#"
        [hosts."a.example"]
        secret = "s"

        [auth]
        allow_anonymous = true
        "#,
    )
    .unwrap();

    let server = dialback_server::start(&config).unwrap();

    assert_eq!(server.providers.names().collect::<Vec<_>>(), vec!["anonymous"]);
    let provider = server.providers.get("anonymous").unwrap();
    assert!(provider.sasl_mechanism().is_some());

    drop(server.runtime);
    server.task.await.unwrap();
}

#[tokio::test]
async fn start_fails_on_invalid_host() {
    let config: Config = toml::from_str(
        r#"
        [hosts."bad host"]
        "#,
    )
    .unwrap();
    assert!(matches!(
        dialback_server::start(&config),
        Err(StartupError::Config(ConfigError::InvalidHost { .. }))
    ));
}

#[tokio::test]
async fn serve_returns_after_shutdown() {
    let config: Config = toml::from_str(
        r#"
        [hosts."a.example"]
        secret = "s"
        "#,
    )
    .unwrap();
    let server = dialback_server::start(&config).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), server.serve(async {}))
        .await
        .expect("serve did not stop the runtime");
}

#[test]
fn logging_installs_once_and_tolerates_bad_filters() {
    let logging = LoggingConfig {
        level: "not[a filter".to_string(),
        json: false,
    };
    dialback_server::init_logging(&logging).unwrap();
    assert!(matches!(
        dialback_server::init_logging(&logging),
        Err(StartupError::Logging(_))
    ));
}
