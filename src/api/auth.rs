// src/api/auth.rs

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::web::{self, ReqData};
use actix_web::{Error, HttpMessage};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::task::{Context, Poll};

use crate::error::ToolError;
use crate::AppState;

/// Session token issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Signed-in user, placed in request extensions by [`JwtMiddleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

/// The signed-in user's id, or `Unauthorized`.
pub fn require_user(user: Option<ReqData<UserId>>) -> Result<String, ToolError> {
    user.map(|u| u.into_inner().0).ok_or(ToolError::Unauthorized)
}

pub fn optional_user(user: Option<ReqData<UserId>>) -> Option<String> {
    user.map(|u| u.into_inner().0)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Middleware that:
/// - reads `Authorization: Bearer <jwt>`
/// - validates the JWT against `JWT_SECRET`
/// - puts `UserId` into `req.extensions_mut()`
///
/// Requests without the header pass through as anonymous; a header with a
/// bad token is rejected with 401.
pub struct JwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtMiddlewareInner<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareInner { service }))
    }
}

pub struct JwtMiddlewareInner<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareInner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let auth_header = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let Some(auth_header) = auth_header else {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        };

        let secret = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state.config.jwt_secret.clone(),
            None => {
                return Box::pin(async move {
                    Err(ToolError::Internal("app state missing".to_string()).into())
                })
            }
        };

        let claims = auth_header
            .strip_prefix("Bearer ")
            .ok_or(())
            .and_then(|token| verify_token(token.trim(), &secret).map_err(|_| ()));

        match claims {
            Ok(claims) if !claims.sub.is_empty() => {
                req.extensions_mut().insert(UserId(claims.sub));
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            _ => {
                log::warn!("rejected bearer token path={}", req.path());
                Box::pin(async move { Err(ToolError::Unauthorized.into()) })
            }
        }
    }
}
