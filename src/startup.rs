use actix_web::dev::Server;
use actix_web::error::JsonPayloadError;
use actix_web::{web, App, HttpRequest, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AccessVerifier, AccountService};
use crate::configuration::GatewaySettings;
use crate::error::{AuthError, ValidationError};
use crate::middleware::{security_headers, Cors, JwtMiddleware, RateLimit, RateLimiter, RequestTrace};
use crate::routes::{
    forward_auth, forward_resource, health_check, login, logout, me, refresh, register, Upstreams,
};

/// Malformed JSON becomes a 400 in the usual error body; oversize stays 413
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    match err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            tracing::warn!(error = %err, "Request body too large");
            err.into()
        }
        other => AuthError::InvalidInput(ValidationError::Body(other.to_string())).into(),
    }
}

/// Assemble the auth service: health, register, login, refresh and the
/// bearer-protected logout.
pub fn run_auth_service(
    listener: TcpListener,
    accounts: Arc<AccountService>,
    body_limit: usize,
) -> Result<Server, std::io::Error> {
    let verifier = accounts.tokens().verifier().clone();
    let accounts = web::Data::from(accounts);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestTrace)
            .app_data(accounts.clone())
            .app_data(
                web::JsonConfig::default()
                    .limit(body_limit)
                    .error_handler(json_error),
            )
            .route("/health", web::get().to(health_check))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .service(
                web::resource("/logout")
                    .wrap(JwtMiddleware::new(verifier.clone()))
                    .route(web::post().to(logout)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Assemble the edge gateway.
///
/// Middleware order, outermost first: request trace, security headers, CORS,
/// then per-client rate limiting on `/api`. Only routes outside `/api/auth`
/// pass the verification filter.
pub fn run_gateway(
    listener: TcpListener,
    settings: GatewaySettings,
    verifier: AccessVerifier,
    client: reqwest::Client,
) -> Result<Server, std::io::Error> {
    let upstreams = web::Data::new(Upstreams {
        auth_service_url: settings.auth_service_url.clone(),
        resource_service_url: settings.resource_service_url.clone(),
    });
    let client = web::Data::new(client);
    let limiter = RateLimiter::new(&settings.rate_limit);
    let allowed_origins = settings.allowed_origins.clone();
    let body_limit = settings.body_limit_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::new(&allowed_origins))
            .wrap(security_headers())
            .wrap(RequestTrace)
            .app_data(web::PayloadConfig::new(body_limit))
            .app_data(client.clone())
            .app_data(upstreams.clone())
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .wrap(RateLimit::new(limiter.clone()))
                    .service(web::scope("/auth").default_service(web::to(forward_auth)))
                    .service(
                        web::scope("")
                            .wrap(JwtMiddleware::new(verifier.clone()))
                            .route("/me", web::get().to(me))
                            .default_service(web::to(forward_resource)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
