// src/auth.rs

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http, Error, HttpMessage, HttpRequest, ResponseError,
};
use futures::future::{ok, Ready};
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Authenticated owner id, placed in request extensions by [`Authentication`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

/// Resolves bearer tokens (HS256 JWT, `sub` claim) to owner ids.
#[derive(Clone)]
pub struct JwtIdentity {
    key: DecodingKey,
}

impl JwtIdentity {
    pub fn new(secret: &str) -> Self {
        JwtIdentity {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn resolve(&self, token: &str) -> ServiceResult<String> {
        let data = decode::<Claims>(token, &self.key, &Validation::default())
            .map_err(|e| ServiceError::Unauthenticated(format!("Invalid token: {}", e)))?;
        if data.claims.sub.trim().is_empty() {
            return Err(ServiceError::Unauthenticated("Invalid token: empty subject".into()));
        }
        Ok(data.claims.sub)
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get(http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// The owner id of the current request, or `Unauthenticated`.
pub fn current_user(req: &HttpRequest) -> ServiceResult<String> {
    req.extensions()
        .get::<OwnerId>()
        .map(|owner| owner.0.clone())
        .ok_or_else(|| ServiceError::Unauthenticated("Unauthorized".to_string()))
}

/// Verifies `Authorization: Bearer` headers. Requests without the header pass
/// through untouched; handlers decide whether they need an owner.
pub struct Authentication {
    identity: JwtIdentity,
}

impl Authentication {
    pub fn new(identity: JwtIdentity) -> Self {
        Authentication { identity }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            identity: self.identity.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    identity: JwtIdentity,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = bearer_token(&req) {
            match self.identity.resolve(&token) {
                Ok(owner_id) => {
                    req.extensions_mut().insert(OwnerId(owner_id));
                }
                Err(e) => {
                    debug!("Rejected token on {}: {}", req.path(), e);
                    let (req_parts, _payload) = req.into_parts();
                    let srv_resp = ServiceResponse::new(req_parts, e.error_response());
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}
