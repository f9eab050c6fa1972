//! Merging of command-line arguments with the configuration file
//!
//! Priority (highest to lowest): CLI arguments, environment variables,
//! configuration file, defaults. A CLI value still equal to its default is
//! treated as unset so the file can override it.

use super::args::ServerArgs;
use super::defaults::*;
use super::file::ConfigFile;
use super::ServerConfig;

/// Build a [`ServerConfig`] from parsed arguments and an optional file
pub fn merge_config_with_args(args: ServerArgs, file: ConfigFile) -> ServerConfig {
    let ConfigFile {
        server,
        mut auth,
        mut tls,
        delegation_token,
    } = file;

    macro_rules! pick_if_default {
        ($cli:expr, $file:expr, $default:expr) => {
            match $file {
                Some(val) if $cli == $default => val,
                _ => $cli,
            }
        };
    }

    macro_rules! apply_option {
        ($target:expr, $cli:expr) => {
            if let Some(val) = $cli {
                $target = val;
            }
        };
    }

    let bind_host = pick_if_default!(args.bind_host, server.bind_host, DEFAULT_BIND_HOST);
    let port = pick_if_default!(args.port, server.port, DEFAULT_PORT);
    let log_level = pick_if_default!(args.log_level, server.log_level, DEFAULT_LOG_LEVEL);

    if args.auth_type.is_some() {
        auth.auth_type = args.auth_type;
    }
    if args.transport_mode != DEFAULT_TRANSPORT_MODE {
        auth.transport_mode = args.transport_mode;
    }
    if args.sasl_qop != DEFAULT_SASL_QOP {
        auth.sasl_qop = args.sasl_qop;
    }
    apply_option!(auth.kerberos_principal, args.kerberos_principal);
    apply_option!(auth.kerberos_keytab, args.kerberos_keytab);
    apply_option!(auth.spnego_principal, args.spnego_principal);
    apply_option!(auth.spnego_keytab, args.spnego_keytab);
    auth.bind_host = bind_host.clone();

    if args.tls_enabled {
        tls.enabled = true;
    }
    apply_option!(tls.cert_path, args.tls_cert);
    apply_option!(tls.key_path, args.tls_key);
    if !args.tls_blacklisted_protocols.is_empty() {
        tls.blacklisted_protocol_versions = args.tls_blacklisted_protocols;
    }

    ServerConfig {
        bind_host,
        port,
        log_level,
        token_store_dir: args.token_store_dir.or(server.token_store_dir),
        auth,
        tls,
        delegation_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_file_values_apply_when_cli_default() {
        let args = ServerArgs::parse_from(["auth-check"]);
        let file = ConfigFile::parse(
            r#"
            [server]
            port = 10443
            bind_host = "node1.example.com"

            [auth]
            auth_type = "LDAP"
            sasl_qop = "auth-int"
            "#,
        )
        .unwrap();

        let config = merge_config_with_args(args, file);
        assert_eq!(config.port, 10443);
        assert_eq!(config.bind_host, "node1.example.com");
        assert_eq!(config.auth.bind_host, "node1.example.com");
        assert_eq!(config.auth.auth_type.as_deref(), Some("LDAP"));
        assert_eq!(config.auth.sasl_qop, "auth-int");
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = ServerArgs::parse_from([
            "auth-check",
            "--port",
            "11000",
            "--auth-type",
            "KERBEROS",
            "--kerberos-principal",
            "hive/_HOST@EXAMPLE.COM",
            "--tls-enabled",
        ]);
        let file = ConfigFile::parse(
            r#"
            [server]
            port = 10443

            [auth]
            auth_type = "LDAP"
            kerberos_principal = "other@EXAMPLE.COM"
            "#,
        )
        .unwrap();

        let config = merge_config_with_args(args, file);
        assert_eq!(config.port, 11000);
        assert_eq!(config.auth.auth_type.as_deref(), Some("KERBEROS"));
        assert_eq!(config.auth.kerberos_principal, "hive/_HOST@EXAMPLE.COM");
        assert!(config.tls.enabled);
    }
}
