//! Configuration loading tests for the auth-check binary

use std::io::Write;

use clap::Parser;
use tempfile::NamedTempFile;
use thriftserver_auth::auth::AuthType;
use thriftserver_auth::config::{ServerArgs, ServerConfig, DEFAULT_PORT};
use thriftserver_auth::server::enabled_protocols;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_file_values_apply_under_defaults() {
    let file = config_file(
        r#"
        [server]
        port = 10001

        [auth]
        auth_type = "kerberos"
        kerberos_principal = "hive/_HOST@EXAMPLE.COM"
        kerberos_keytab = "/etc/hive.keytab"
        sasl_qop = "auth-int"

        [[auth.proxy_users]]
        real_user = "hue"
        hosts = ["*"]
        users = ["*"]

        [tls]
        blacklisted_protocol_versions = ["TLSv1.2"]
        "#,
    );
    let path = file.path().to_string_lossy().to_string();
    let args = ServerArgs::parse_from(["auth-check", "--config", path.as_str()]);
    let config = ServerConfig::from_args(args).unwrap();

    assert_eq!(config.port, 10001);
    assert_eq!(config.auth.sasl_qop, "auth-int");
    assert_eq!(config.auth.proxy_users.len(), 1);
    assert_eq!(
        AuthType::resolve(config.auth.auth_type.as_deref(), config.auth.is_http()).unwrap(),
        AuthType::Kerberos
    );
    assert!(config.validate().is_ok());
    assert_eq!(enabled_protocols(&config.tls), vec!["TLSv1.3"]);
}

#[test]
fn test_cli_overrides_file() {
    let file = config_file(
        r#"
        [auth]
        auth_type = "LDAP"

        [tls]
        blacklisted_protocol_versions = ["TLSv1.3"]
        "#,
    );
    let path = file.path().to_string_lossy().to_string();
    let config = ServerConfig::from_args(ServerArgs::parse_from([
        "auth-check",
        "--config",
        path.as_str(),
        "--auth-type",
        "NONE",
        "--tls-blacklisted-protocols",
        "TLSv1,TLSv1.1",
    ]))
    .unwrap();

    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.auth.auth_type.as_deref(), Some("NONE"));
    assert_eq!(
        enabled_protocols(&config.tls),
        vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()]
    );
}

#[test]
fn test_http_defaults_to_nosasl() {
    let config = ServerConfig::from_args(ServerArgs::parse_from([
        "auth-check",
        "--transport-mode",
        "http",
    ]))
    .unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(
        AuthType::resolve(config.auth.auth_type.as_deref(), config.auth.is_http()).unwrap(),
        AuthType::NoSasl
    );
}

#[test]
fn test_malformed_file_is_rejected() {
    let file = config_file("[auth\nauth_type = ");
    let path = file.path().to_string_lossy().to_string();
    let args = ServerArgs::parse_from(["auth-check", "--config", path.as_str()]);
    let err = ServerConfig::from_args(args).unwrap_err();
    assert!(err.is_fatal());
}
