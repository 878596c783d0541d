/// Gateway Routes
///
/// Forwarding of `/api/auth/*` to the auth service and of verified `/api/*`
/// traffic to the resource service. The gateway holds no session state:
/// identity comes from the verification filter and is passed upstream as
/// `X-User-Id`, replacing anything the client sent under that name.

use actix_web::{http::StatusCode, web, HttpMessage, HttpRequest, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AuthError, ErrorResponse};
use crate::middleware::{AuthenticatedUser, TraceId, TRACE_HEADER};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const AUTH_PREFIX: &str = "/api/auth";
pub const API_PREFIX: &str = "/api";

/// Headers that never cross the proxy
const STRIPPED_HEADERS: [&str; 11] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
    USER_ID_HEADER,
];

/// Upstream base URLs the gateway forwards to
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub auth_service_url: String,
    pub resource_service_url: Option<String>,
}

fn is_stripped(name: &str) -> bool {
    STRIPPED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Path left after removing `prefix`, always starting with `/`
fn tail_path<'a>(path: &'a str, prefix: &str) -> &'a str {
    match path.strip_prefix(prefix) {
        Some(rest) if rest.starts_with('/') => rest,
        _ => "/",
    }
}

fn upstream_url(base: &str, tail: &str, query: &str) -> String {
    let mut url = format!("{}{}", base.trim_end_matches('/'), tail);
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}

fn upstream_headers(req: &HttpRequest, user_id: Option<Uuid>) -> reqwest::header::HeaderMap {
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

    let mut headers = HeaderMap::new();
    for (name, value) in req.headers().iter() {
        if is_stripped(name.as_str()) || name.as_str() == TRACE_HEADER {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    if let Some(trace_id) = req.extensions().get::<TraceId>() {
        if let Ok(value) = HeaderValue::from_str(&trace_id.0) {
            headers.insert(HeaderName::from_static(TRACE_HEADER), value);
        }
    }

    if let Some(user_id) = user_id {
        if let Ok(value) = HeaderValue::from_str(&user_id.to_string()) {
            headers.insert(HeaderName::from_static(USER_ID_HEADER), value);
        }
    }

    headers
}

async fn forward(
    client: &reqwest::Client,
    req: &HttpRequest,
    body: web::Bytes,
    url: String,
    user_id: Option<Uuid>,
) -> Result<HttpResponse, AuthError> {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| AuthError::Internal(format!("Unsupported method: {}", e)))?;

    tracing::debug!(method = %method, url = %url, "Forwarding request upstream");

    let upstream = client
        .request(method, &url)
        .headers(upstream_headers(req, user_id))
        .body(body.to_vec())
        .send()
        .await
        .map_err(|e| {
            tracing::error!(url = %url, error = %e, "Upstream request failed");
            AuthError::Unavailable(format!("upstream unreachable: {}", e))
        })?;

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| AuthError::Internal(format!("Invalid upstream status: {}", e)))?;

    let mut response = HttpResponse::build(status);
    for (name, value) in upstream.headers().iter() {
        if is_stripped(name.as_str()) {
            continue;
        }
        response.append_header((name.as_str(), value.as_bytes()));
    }

    let bytes = upstream.bytes().await.map_err(|e| {
        tracing::error!(url = %url, error = %e, "Failed to read upstream response");
        AuthError::Unavailable(format!("upstream body: {}", e))
    })?;

    Ok(response.body(bytes))
}

/// ANY /api/auth/*
///
/// Forwarded to the auth service without verification.
pub async fn forward_auth(
    req: HttpRequest,
    body: web::Bytes,
    client: web::Data<reqwest::Client>,
    upstreams: web::Data<Upstreams>,
) -> Result<HttpResponse, AuthError> {
    let url = upstream_url(
        &upstreams.auth_service_url,
        tail_path(req.path(), AUTH_PREFIX),
        req.query_string(),
    );
    forward(&client, &req, body, url, None).await
}

/// ANY /api/* behind the verification filter
///
/// 404 when no resource service is configured.
pub async fn forward_resource(
    req: HttpRequest,
    body: web::Bytes,
    user: web::ReqData<AuthenticatedUser>,
    client: web::Data<reqwest::Client>,
    upstreams: web::Data<Upstreams>,
) -> Result<HttpResponse, AuthError> {
    let base = match upstreams.resource_service_url.as_deref() {
        Some(base) => base,
        None => {
            let error_id = Uuid::new_v4().to_string();
            return Ok(HttpResponse::NotFound().json(ErrorResponse::new(
                error_id,
                "No such route".to_string(),
                "NOT_FOUND".to_string(),
                404,
            )));
        }
    };

    let url = upstream_url(base, tail_path(req.path(), API_PREFIX), req.query_string());
    forward(&client, &req, body, url, Some(user.user_id)).await
}

/// GET /api/me
pub async fn me(user: web::ReqData<AuthenticatedUser>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "userId": user.user_id }))
}
