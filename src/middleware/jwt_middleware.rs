/// Bearer-token verification filter
///
/// Runs in front of every protected route. The only work done per request is
/// an in-memory signature and expiry check through `AccessVerifier`; there
/// is no store lookup. On success the verified user is placed in the request
/// extensions as `AuthenticatedUser`. On failure the request is answered
/// with 401 and never reaches the wrapped service.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use uuid::Uuid;

use crate::auth::AccessVerifier;
use crate::error::{AuthError, TokenRejection};

/// Identity attached to requests that passed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme name is case-insensitive.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.trim_start().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
}

pub struct JwtMiddleware {
    verifier: Rc<AccessVerifier>,
}

impl JwtMiddleware {
    pub fn new(verifier: AccessVerifier) -> Self {
        Self {
            verifier: Rc::new(verifier),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    verifier: Rc<AccessVerifier>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
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
        let header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok());

        let verified = match bearer_token(header) {
            None => {
                tracing::warn!(path = %req.path(), "Missing or invalid Authorization header");
                Err(TokenRejection::Malformed)
            }
            Some(token) => self.verifier.verify_user(token),
        };

        match verified {
            Ok(user_id) => {
                req.extensions_mut().insert(AuthenticatedUser { user_id });
                tracing::debug!(user_id = %user_id, "Access token verified");

                let service = self.service.clone();
                Box::pin(async move { Ok(service.call(req).await?.map_into_left_body()) })
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, path = %req.path(), "Access token rejected");
                let response = req.error_response(AuthError::Token(reason));
                Box::pin(async move { Ok(response.map_into_right_body()) })
            }
        }
    }
}
