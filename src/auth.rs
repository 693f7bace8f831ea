//! Bearer-token verification and the session policy.
//!
//! Tokens come from the external identity provider; this service only checks
//! them. Whether sessions may end on their own (token expiry, idle timers on
//! the page) is decided by `SessionPolicy`, not by intercepting sign-out.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use futures::future::{ok, Ready};
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::info;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::{PortalError, Result};

pub const SESSION_HEADER: &str = "X-Session-Id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity-provider uid.
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutReason {
    /// The user clicked "sair".
    User,
    /// Token or session lifetime ran out.
    Expired,
    /// Page idle timer fired.
    Idle,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub allow_auto_logout: bool,
}

impl SessionPolicy {
    /// Expired tokens are only refused when automatic logout is allowed.
    pub fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.validate_exp = self.allow_auto_logout;
        validation
    }

    pub fn honours(&self, reason: LogoutReason) -> bool {
        match reason {
            LogoutReason::User => true,
            LogoutReason::Expired | LogoutReason::Idle => self.allow_auto_logout,
        }
    }
}

pub fn validate_jwt(token: &str, secret: &str, policy: &SessionPolicy) -> Result<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &policy.validation())
        .map(|data| data.claims)
        .map_err(|e| PortalError::Unauthorized(format!("token decode error: {}", e)))
}

/// Verifies `Authorization: Bearer` tokens and stores the `Claims` as a
/// request extension. Requests without a token pass through anonymously.
pub struct Authentication {
    secret: String,
    policy: SessionPolicy,
}

impl Authentication {
    pub fn new(secret: &str, policy: SessionPolicy) -> Self {
        Self { secret: secret.to_string(), policy }
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
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
            policy: self.policy,
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: String,
    policy: SessionPolicy,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        if let Some(token) = token {
            match validate_jwt(&token, &self.secret, &self.policy) {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                }
                Err(e) => {
                    let (req_parts, _payload) = req.into_parts();
                    let resp = HttpResponse::Unauthorized()
                        .json(serde_json::json!({ "error": e.to_string() }))
                        .map_into_boxed_body();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
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

/// Claims of the signed-in caller.
pub fn current_user(req: &HttpRequest) -> Result<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| PortalError::Unauthorized("sign in required".to_string()))
}

/// Session used for likes and duplicate suppression: the `X-Session-Id`
/// header, falling back to the caller's uid.
pub fn session_id(req: &HttpRequest) -> Result<String> {
    if let Some(session) = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Ok(session.to_string());
    }
    current_user(req)
        .map(|c| c.sub)
        .map_err(|_| PortalError::validation("missing X-Session-Id header"))
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub reason: LogoutReason,
}

/// POST /auth/logout
pub async fn logout(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LogoutRequest>,
) -> Result<HttpResponse> {
    let claims = current_user(&req)?;
    let signed_out = data.policy.honours(payload.reason);
    if signed_out {
        info!("user {} signed out ({:?})", claims.sub, payload.reason);
    } else {
        info!("automatic sign-out for {} ignored by session policy", claims.sub);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "signedOut": signed_out })))
}
