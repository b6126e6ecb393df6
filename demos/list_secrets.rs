//! Example: List the secrets of a vault, authenticating with client credentials.
//!
//! 1. Load the config for a profile (file + `KEYVAULT_*` environment variables)
//! 2. Build an `AuthenticationLayer` from the configured client credentials
//! 3. Compose a Tower service stack with auth + user-agent + decompression
//! 4. List the vault's secrets, and print one value if a name is given
//!
//! # Prerequisites
//!
//! Either a config file at the default path (e.g.
//! `~/.config/keyvault/config.toml` on Linux) or the environment variables
//! `KEYVAULT_VAULT_URL`, `KEYVAULT_CLIENT_ID` and `KEYVAULT_CLIENT_SECRET`.
//!
//! # Usage
//!
//! ```sh
//! cargo run --example list_secrets -- [profile] [secret-name]
//! ```

use bytes::Bytes;
use http::{HeaderValue, header::USER_AGENT};
use http_body_util::Full;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tower::ServiceBuilder;
use tower_http::{decompression::DecompressionLayer, set_header::SetRequestHeaderLayer};

use keyvault::{client::AuthenticationLayer, config, vault::KeyVault};

#[tokio::main]
async fn main() {
    // Control verbosity via the RUST_LOG env var:
    //   RUST_LOG=keyvault=debug cargo run --example list_secrets
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyvault=info".parse().unwrap()),
        )
        .init();

    // Both ring and aws-lc-rs may be compiled in, so pick one explicitly.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install ring crypto provider");

    let mut args = std::env::args().skip(1);
    let profile = args.next().unwrap_or_else(|| config::DEFAULT_PROFILE.to_string());
    let secret_name = args.next();
    println!("Using profile: {profile}");

    let cfg = config::load_config(Some(&profile)).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}");
        std::process::exit(1);
    });

    let auth_layer = AuthenticationLayer::from_config(&cfg).unwrap_or_else(|e| {
        eprintln!("Failed to create auth layer: {e}");
        std::process::exit(1);
    });

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    let http_client: Client<_, Full<Bytes>> =
        Client::builder(TokioExecutor::new()).build(https_connector);

    // The request flows through SetRequestHeader → Authentication →
    // Decompression → Client. Token requests skip the user-agent layer.
    let service = ServiceBuilder::new()
        .layer(SetRequestHeaderLayer::overriding(
            USER_AGENT,
            HeaderValue::from_static(concat!("keyvault/", env!("CARGO_PKG_VERSION"))),
        ))
        .layer(auth_layer)
        .layer(DecompressionLayer::new())
        .service(http_client);

    let vault = KeyVault::from_config(service, &cfg).unwrap_or_else(|e| {
        eprintln!("Failed to create vault client: {e}");
        std::process::exit(1);
    });
    println!("Vault:   {} (api-version {})", vault.url(), vault.api_version());

    match vault.secrets().await {
        Ok(secrets) => {
            println!("\n{} secret(s):", secrets.len());
            for secret in &secrets {
                let enabled = secret
                    .attributes
                    .as_ref()
                    .and_then(|a| a.enabled)
                    .unwrap_or(true);
                println!(
                    "  {:<40} enabled={enabled} content-type={}",
                    secret.id.name().unwrap_or(secret.id.as_str()),
                    secret.content_type.as_deref().unwrap_or("-"),
                );
            }
        }
        Err(e) => {
            eprintln!("Failed to list secrets: {e}");
            std::process::exit(1);
        }
    }

    if let Some(name) = secret_name {
        match vault.value(&vault.secret(&name)).await {
            Ok(value) => println!("\n{name} = {}", value.value),
            Err(e) => eprintln!("Failed to read {name}: {e}"),
        }
    }
}
