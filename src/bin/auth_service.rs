use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use authgate::auth::{AccountService, TokenService};
use authgate::clock::{Clock, SystemClock};
use authgate::configuration::{get_configuration, Settings, StorageBackend};
use authgate::startup::run_auth_service;
use authgate::store::{
    CredentialStore, InMemoryCredentialStore, InMemoryUserStore, PgCredentialStore, PgUserStore,
    UserStore,
};
use authgate::telemetry::init_telemetry;

fn io_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

async fn build_stores(
    configuration: &Settings,
    clock: Arc<dyn Clock>,
) -> std::io::Result<(Arc<dyn UserStore>, Arc<dyn CredentialStore>)> {
    match configuration.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; users and sessions are lost on restart");
            Ok((
                Arc::new(InMemoryUserStore::new()),
                Arc::new(InMemoryCredentialStore::new(clock)),
            ))
        }
        StorageBackend::Postgres => {
            let database = configuration.database.as_ref().ok_or_else(|| {
                tracing::error!("storage.backend is postgres but no database settings were given");
                io_error(std::io::ErrorKind::InvalidInput, "Configuration error")
            })?;

            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(configuration.storage.timeout())
                .connect(&database.connection_string())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    io_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
                })?;

            sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                io_error(std::io::ErrorKind::Other, "Database migration error")
            })?;

            let credentials = PgCredentialStore::new(pool.clone());
            match credentials.purge_expired().await {
                Ok(purged) => tracing::info!(purged = purged, "Expired refresh sessions purged"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired refresh sessions"),
            }

            Ok((Arc::new(PgUserStore::new(pool)), Arc::new(credentials)))
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting auth service");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(io_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (users, credentials) = build_stores(&configuration, clock.clone()).await?;
    let store_timeout = configuration.storage.timeout();

    let tokens = Arc::new(TokenService::new(
        &configuration.jwt,
        credentials,
        clock,
        store_timeout,
    ));
    let accounts = AccountService::new(users, tokens, configuration.password.hash_cost, store_timeout)
        .map_err(|e| {
            tracing::error!("Failed to initialize account service: {}", e);
            io_error(std::io::ErrorKind::InvalidInput, "Password hashing configuration error")
        })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Auth service listening on: {}", address);

    let server = run_auth_service(
        listener,
        Arc::new(accounts),
        configuration.gateway.body_limit_bytes,
    )?;
    server.await
}
