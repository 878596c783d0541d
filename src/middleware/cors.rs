/// CORS middleware restricted to a configured origin list.
///
/// Preflight requests are answered here; actual requests from an allowed
/// origin get `Access-Control-Allow-Origin` added to the response.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderValue},
        Method,
    },
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::collections::HashSet;
use std::rc::Rc;

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type, X-Trace-Id";
const EXPOSED_HEADERS: &str =
    "X-Trace-Id, RateLimit-Limit, RateLimit-Remaining, RateLimit-Reset, Retry-After";
const PREFLIGHT_MAX_AGE: &str = "600";

pub struct Cors {
    allowed_origins: Rc<HashSet<String>>,
}

impl Cors {
    pub fn new(allowed_origins: &[String]) -> Self {
        Self {
            allowed_origins: Rc::new(
                allowed_origins
                    .iter()
                    .map(|o| o.trim_end_matches('/').to_string())
                    .collect(),
            ),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Cors
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(CorsService {
            service: Rc::new(service),
            allowed_origins: self.allowed_origins.clone(),
        }))
    }
}

pub struct CorsService<S> {
    service: Rc<S>,
    allowed_origins: Rc<HashSet<String>>,
}

impl<S> CorsService<S> {
    fn allowed_origin(&self, req: &ServiceRequest) -> Option<HeaderValue> {
        let origin = req.headers().get(header::ORIGIN)?;
        let value = origin.to_str().ok()?;
        self.allowed_origins
            .contains(value)
            .then(|| origin.clone())
    }
}

impl<S, B> Service<ServiceRequest> for CorsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let origin = self.allowed_origin(&req);
        let is_preflight = req.method() == Method::OPTIONS
            && req
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

        if is_preflight {
            let mut response = HttpResponse::NoContent();
            response.insert_header((header::VARY, "Origin"));
            match origin {
                Some(origin) => {
                    response
                        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin))
                        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS))
                        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS))
                        .insert_header((header::ACCESS_CONTROL_MAX_AGE, PREFLIGHT_MAX_AGE));
                }
                None => {
                    tracing::debug!(path = %req.path(), "Preflight from disallowed origin");
                }
            }
            let response = req.into_response(response.finish()).map_into_right_body();
            return Box::pin(async move { Ok(response) });
        }

        let service = self.service.clone();
        Box::pin(async move {
            let mut res = service.call(req).await?;
            if let Some(origin) = origin {
                let headers = res.headers_mut();
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                headers.insert(
                    header::ACCESS_CONTROL_EXPOSE_HEADERS,
                    HeaderValue::from_static(EXPOSED_HEADERS),
                );
                headers.append(header::VARY, HeaderValue::from_static("Origin"));
            }
            Ok(res.map_into_left_body())
        })
    }
}
