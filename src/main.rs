//! auth-check: validate the authentication configuration of a Thrift server
//!
//! Loads the configuration, performs the startup strategy selection (and
//! Kerberos login, when configured) and reports what the server would run
//! with. Exits non-zero on any fatal configuration problem.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use thriftserver_auth::auth::{
    login_from_spnego_keytab, AuthFactory, AuthType, FileTokenStore, LocalCredentialAuthority,
    ServerCredentialContext, TokenStore,
};
use thriftserver_auth::config::{ServerArgs, ServerConfig};
use thriftserver_auth::error::Result;
use thriftserver_auth::server::{enabled_protocols, load_tls_config, server_address};
use thriftserver_auth::telemetry;

fn main() -> Result<()> {
    let args = ServerArgs::parse();
    let config_path = args.config.clone();

    let config = ServerConfig::from_args(args)?;
    telemetry::init_logging(&config.log_level)?;

    if let Some(path) = config_path {
        info!(path = %path.display(), "Configuration loaded from file");
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e);
    }

    let auth_type = AuthType::resolve(config.auth.auth_type.as_deref(), config.auth.is_http())?;
    let authority = Arc::new(LocalCredentialAuthority::new(
        auth_type == AuthType::Kerberos,
        config.auth.proxy_users.clone(),
    ));
    let credentials = Arc::new(ServerCredentialContext::new(authority.clone()));

    let mut builder = AuthFactory::builder(config.auth.clone(), credentials)
        .token_config(config.delegation_token.clone());
    if let Some(dir) = config.token_store_dir.as_ref() {
        let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(dir)?);
        info!(dir = %dir.display(), "Using file-backed delegation token store");
        builder = builder.token_store(store);
    }

    let factory = match builder.build() {
        Ok(factory) => factory,
        Err(e) => {
            error!(error = %e, sql_state = e.sql_state(), "Authentication setup failed");
            return Err(e);
        }
    };

    if config.auth.is_http() && !config.auth.spnego_principal.trim().is_empty() {
        let identity = login_from_spnego_keytab(&config.auth, authority.as_ref())?;
        println!("SPNEGO principal: {}", identity.user_name);
    }

    println!(
        "Listening address: {}",
        server_address(&config.bind_host, config.port)
    );
    println!("Authentication:    {}", factory.auth_type());
    println!("Transport mode:    {}", config.auth.transport_mode);
    if let Some(properties) = factory.strategy().sasl_properties() {
        println!("SASL QOP:          {}", properties.qop());
    }
    if let Some(login) = factory.credentials().current() {
        println!("Server principal:  {}", login.principal);
    }

    match factory.token_manager() {
        Some(manager) => {
            let stats = manager.stats()?;
            println!(
                "Delegation tokens: enabled ({} stored, {} master keys)",
                stats.total, stats.master_keys
            );
        }
        None => println!("Delegation tokens: unavailable"),
    }

    if config.tls.enabled {
        load_tls_config(&config.tls)?;
        println!("TLS protocols:     {}", enabled_protocols(&config.tls).join(", "));
    } else if !config.tls.blacklisted_protocol_versions.is_empty() {
        warn!("TLS protocol blacklist configured but TLS is disabled");
    }

    factory.shutdown();
    Ok(())
}
