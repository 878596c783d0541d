/// Request tracing middleware
///
/// Gives every request a trace id (taken from `X-Trace-Id` when the caller
/// supplies a sane one, generated otherwise), runs the rest of the pipeline
/// inside a `tracing` span carrying it, and echoes it on the response so
/// clients and upstream services can correlate log lines.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;

pub const TRACE_HEADER: &str = "x-trace-id";
const MAX_TRACE_ID_LENGTH: usize = 128;

/// Trace id of the current request, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

fn accept_trace_id(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_TRACE_ID_LENGTH)
        .filter(|v| v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .map(str::to_string)
}

pub struct RequestTrace;

impl<S, B> Transform<S, ServiceRequest> for RequestTrace
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestTraceService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestTraceService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestTraceService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestTraceService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let trace_id = accept_trace_id(req.headers().get(TRACE_HEADER).and_then(|h| h.to_str().ok()))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let method = req.method().to_string();
        let path = req.path().to_string();

        req.extensions_mut().insert(TraceId(trace_id.clone()));

        let span = tracing::info_span!(
            "http_request",
            trace_id = %trace_id,
            method = %method,
            path = %path,
        );

        let service = self.service.clone();

        Box::pin(
            async move {
                let result = service.call(req).await;
                let elapsed_ms = start_time.elapsed().as_millis() as u64;

                match result {
                    Ok(mut res) => {
                        tracing::info!(
                            status = res.status().as_u16(),
                            elapsed_ms = elapsed_ms,
                            "Request completed"
                        );
                        if let Ok(value) = HeaderValue::from_str(&trace_id) {
                            res.headers_mut()
                                .insert(HeaderName::from_static(TRACE_HEADER), value);
                        }
                        Ok(res)
                    }
                    Err(err) => {
                        tracing::error!(error = %err, elapsed_ms = elapsed_ms, "Request failed");
                        Err(err)
                    }
                }
            }
            .instrument(span),
        )
    }
}
