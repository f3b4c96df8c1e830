use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use passport_auth::chain::{CachedChainReader, ChainClient};
use passport_auth::config::VerifierSettings;
use passport_auth::modules::http_auth;
use passport_auth::modules::metrics::{MeteredChainReader, VerifierMetrics};
use passport_auth::modules::secure_keys::MasterSecret;
use passport_auth::verifier::{SessionVerifier, Verifier};
use tokio::fs;
use tokio::net::TcpListener;

const CHAIN_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let settings = VerifierSettings::from_env()?;

    // Master secret for tokens and resource keys
    let master = match &settings.key_path {
        Some(path) => {
            let pem = fs::read_to_string(path).await?;
            info!("Loaded master secret from {}", path);
            MasterSecret::from_sec1_pem(&pem)?
        }
        None => {
            warn!("VERIFIER_KEY_PATH not set; using an ephemeral master secret");
            MasterSecret::generate()
        }
    };

    let metrics = Arc::new(VerifierMetrics::new()?);

    // Chain reader, timed below the cache
    let chain_client = ChainClient::new(settings.chain_rpc_url.clone());
    if let Err(e) = chain_client.connect().await {
        warn!("Chain not reachable at startup: {}", e);
    }
    let chain = CachedChainReader::new(
        MeteredChainReader::new(chain_client, metrics.clone()),
        master.cache_integrity_secret()?,
    );

    let verifier = Arc::new(Verifier::new(settings.verifier_config(), chain, master)?);
    info!(
        "Verifier ready for package {} (max ttl {} min)",
        settings.scope, settings.max_ttl_min
    );

    // Watch node health in the background
    let health_verifier = verifier.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(CHAIN_HEALTH_INTERVAL).await;
            let client = health_verifier.chain().inner().inner();
            if let Err(e) = client.validate_node_health().await {
                error!("Chain health check failed: {}", e);
            }
        }
    });

    let state: Arc<dyn SessionVerifier> = verifier;
    let app = http_auth::router(state, metrics);

    // Bind the server
    let listener = TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    info!("Listening on: 0.0.0.0:{}", settings.port);
    axum::serve(listener, app).await?;

    Ok(())
}
