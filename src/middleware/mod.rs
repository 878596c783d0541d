/// Middleware module
///
/// Bearer verification, request tracing, rate limiting, CORS and the
/// security headers applied by the gateway.

mod cors;
mod jwt_middleware;
mod rate_limit;
mod request_trace;

pub use cors::Cors;
pub use jwt_middleware::{bearer_token, AuthenticatedUser, JwtMiddleware};
pub use rate_limit::{RateDecision, RateLimit, RateLimiter};
pub use request_trace::{RequestTrace, TraceId, TRACE_HEADER};

use actix_web::middleware::DefaultHeaders;

/// Security headers attached to every gateway response
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add(("Strict-Transport-Security", "max-age=31536000; includeSubDomains"))
        .add(("Content-Security-Policy", "default-src 'none'; frame-ancestors 'none'"))
}
