//! Signing test server.
//!
//! Starts the dispatch server on loopback, builds a root and an intermediate
//! authority, and serves their certificates and OCSP responders until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use signing_test_server::config::{load_config, ServerConfig};
use signing_test_server::observability::{logging, metrics};
use signing_test_server::pki::{generate_key, AuthoritySettings, CertificateAuthority};
use signing_test_server::DispatchServer;

#[derive(Parser)]
#[command(name = "signing-test-server")]
#[command(about = "Loopback OCSP and certificate server for signing tests", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("signing-test-server v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?);
    }

    let server = DispatchServer::start(&config).await?;

    let key_bits = config.authority.key_bits;
    let (root_key, intermediate_key) = tokio::task::spawn_blocking(move || {
        Ok::<_, signing_test_server::pki::AuthorityError>((
            generate_key(key_bits)?,
            generate_key(key_bits)?,
        ))
    })
    .await??;

    let root_settings = AuthoritySettings::from(&config.authority);
    let intermediate_settings = AuthoritySettings {
        common_name: format!("{} Intermediate", root_settings.common_name),
        ..root_settings.clone()
    };
    let root = CertificateAuthority::create_root(server.url(), root_settings, root_key)?;
    let intermediate = root.create_intermediate(intermediate_settings, intermediate_key)?;

    let mut registrations = Vec::new();
    for authority in [&root, &intermediate] {
        registrations.push(server.register(Arc::new(authority.certificate_responder()))?);
        registrations.push(server.register(Arc::new(authority.ocsp_responder()))?);
        tracing::info!(
            authority = %authority.id(),
            subject = %authority.subject(),
            certificate_url = %authority.certificate_url(),
            ocsp_url = %authority.ocsp_url(),
            "Authority ready"
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    drop(registrations);
    server.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
