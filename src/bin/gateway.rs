use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use authgate::auth::AccessVerifier;
use authgate::clock::SystemClock;
use authgate::configuration::get_configuration;
use authgate::startup::run_gateway;
use authgate::telemetry::init_telemetry;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting gateway");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // Only the access secret is needed here; the gateway never sees stores
    let verifier = AccessVerifier::new(
        &configuration.jwt.access_secret,
        configuration.jwt.issuer.clone(),
        Arc::new(SystemClock),
    );

    let client = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| {
            tracing::error!("Failed to build upstream HTTP client: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "HTTP client error")
        })?;

    let gateway = configuration.gateway;
    let address = format!("{}:{}", gateway.host, gateway.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!(
        auth_service = %gateway.auth_service_url,
        "Gateway listening on: {}",
        address
    );

    let server = run_gateway(listener, gateway, verifier, client)?;
    server.await
}
