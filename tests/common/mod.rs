//! Helpers for spawning the auth service, the gateway and a stand-in
//! resource service on random local ports.
#![allow(dead_code)]

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::json;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use authgate::auth::{AccountService, TokenService};
use authgate::clock::ManualClock;
use authgate::configuration::{GatewaySettings, JwtSettings, RateLimitSettings};
use authgate::startup::{run_auth_service, run_gateway};
use authgate::store::{InMemoryCredentialStore, InMemoryUserStore, UserStore};

pub const BODY_LIMIT: usize = 64 * 1024;

pub struct TestApp {
    pub address: String,
    pub clock: Arc<ManualClock>,
    pub credentials: Arc<InMemoryCredentialStore>,
}

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        access_secret: "integration-access-secret-0123456789".to_string(),
        refresh_secret: "integration-refresh-secret-0123456789".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604_800,
        issuer: "authgate-test".to_string(),
    }
}

fn bind_random_port() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    (listener, format!("http://127.0.0.1:{}", port))
}

pub fn spawn_auth_service() -> TestApp {
    spawn_auth_service_with_users(Arc::new(InMemoryUserStore::new()))
}

pub fn spawn_auth_service_with_users(users: Arc<dyn UserStore>) -> TestApp {
    let (listener, address) = bind_random_port();

    let clock = Arc::new(ManualClock::starting_now());
    let credentials = Arc::new(InMemoryCredentialStore::new(clock.clone()));
    let timeout = Duration::from_secs(2);

    let tokens = Arc::new(TokenService::new(
        &jwt_settings(),
        credentials.clone(),
        clock.clone(),
        timeout,
    ));
    let accounts = AccountService::new(users, tokens, 4, timeout)
        .expect("Failed to build account service");

    let server = run_auth_service(listener, Arc::new(accounts), BODY_LIMIT)
        .expect("Failed to create server");
    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    TestApp {
        address,
        clock,
        credentials,
    }
}

pub fn gateway_settings(auth_service_url: &str) -> GatewaySettings {
    GatewaySettings {
        host: "127.0.0.1".to_string(),
        port: 0,
        auth_service_url: auth_service_url.to_string(),
        resource_service_url: None,
        allowed_origins: vec!["https://app.example.com".to_string()],
        rate_limit: RateLimitSettings {
            window_seconds: 900,
            max_requests: 100,
        },
        body_limit_bytes: BODY_LIMIT,
    }
}

/// Spawn a gateway whose verifier shares `auth`'s clock
pub fn spawn_gateway(auth: &TestApp, settings: GatewaySettings) -> String {
    let (listener, address) = bind_random_port();

    let settings_jwt = jwt_settings();
    let verifier = authgate::auth::AccessVerifier::new(
        &settings_jwt.access_secret,
        settings_jwt.issuer.clone(),
        auth.clock.clone(),
    );

    let server = run_gateway(listener, settings, verifier, reqwest::Client::new())
        .expect("Failed to create gateway");
    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    address
}

async fn echo(req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let user_ids: Vec<String> = req
        .headers()
        .get_all("x-user-id")
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    let trace_id = req
        .headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    HttpResponse::Ok().json(json!({
        "method": req.method().as_str(),
        "path": req.path(),
        "query": req.query_string(),
        "userIds": user_ids,
        "traceId": trace_id,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Resource service that reflects what it received
pub fn spawn_echo_service() -> String {
    let (listener, address) = bind_random_port();

    let server = HttpServer::new(|| App::new().default_service(web::to(echo)))
        .listen(listener)
        .expect("Failed to bind echo service")
        .run();
    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    address
}

/// An address nothing is listening on
pub fn closed_address() -> String {
    let (listener, address) = bind_random_port();
    drop(listener);
    address
}
