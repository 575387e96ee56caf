//! # Authentication Middleware
//!
//! Bearer-token check plus actor extraction.
//!
//! The API sits behind a trusted gateway that terminates user sessions. The
//! gateway forwards a shared bearer token together with the caller identity:
//!
//! ```text
//! Authorization: Bearer {CC_AUTH_TOKEN}
//! X-User-Guid:   {user guid}
//! X-User-Email:  {email}              (optional)
//! X-Scopes:      cloud_controller.read cloud_controller.write
//! ```
//!
//! The middleware injects an [`Actor`] into request extensions. When no
//! token is configured, authentication is disabled and every request runs as
//! an admin actor.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cc_core::Guid;
use subtle::ConstantTimeEq;

use crate::error::{ApiError, ErrorBody};

pub const READ_SCOPE: &str = "cloud_controller.read";
pub const WRITE_SCOPE: &str = "cloud_controller.write";
pub const ADMIN_SCOPE: &str = "cloud_controller.admin";

pub const USER_GUID_HEADER: &str = "x-user-guid";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const SCOPES_HEADER: &str = "x-scopes";

/// Guid recorded for the actor when authentication is disabled and no
/// `X-User-Guid` header is sent.
pub const ANONYMOUS_ADMIN_GUID: &str = "anonymous-admin";

/// OAuth-style scopes granted to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scopes {
    pub read: bool,
    pub write: bool,
    pub admin: bool,
}

impl Scopes {
    pub fn admin() -> Self {
        Self {
            read: true,
            write: true,
            admin: true,
        }
    }

    /// Parse a whitespace- or comma-separated scope list. Unknown scopes are
    /// ignored.
    pub fn parse(value: &str) -> Self {
        let mut scopes = Self::default();
        for scope in value
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
        {
            match scope {
                READ_SCOPE => scopes.read = true,
                WRITE_SCOPE => scopes.write = true,
                ADMIN_SCOPE => scopes.admin = true,
                _ => {}
            }
        }
        scopes
    }

    pub fn can_read(&self) -> bool {
        self.admin || self.read
    }

    pub fn can_write(&self) -> bool {
        self.admin || self.write
    }
}

/// The user on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub guid: Guid,
    pub email: Option<String>,
    pub scopes: Scopes,
}

impl Actor {
    pub fn admin() -> Self {
        Self {
            guid: Guid::from(ANONYMOUS_ADMIN_GUID),
            email: None,
            scopes: Scopes::admin(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.scopes.admin
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .ok_or_else(|| ApiError::InvalidAuthToken("no actor in request context".into()))
    }
}

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Constant-time comparison of bearer tokens.
///
/// When lengths differ, performs a dummy comparison so timing does not
/// depend on where the mismatch is.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the actor from the gateway identity headers.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, String> {
    let guid = header_str(headers, USER_GUID_HEADER)
        .ok_or_else(|| "missing X-User-Guid header".to_string())?;
    Ok(Actor {
        guid: Guid::from(guid),
        email: header_str(headers, USER_EMAIL_HEADER).map(str::to_string),
        scopes: header_str(headers, SCOPES_HEADER)
            .map(Scopes::parse)
            .unwrap_or_default(),
    })
}

/// Validate the bearer token and inject the caller's [`Actor`].
///
/// When `AuthConfig.token` is `None`, every request runs as admin; identity
/// headers, if sent, still name the actor for audit events.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(value) if value.starts_with("Bearer ") => {
                    if !constant_time_token_eq(&value[7..], expected) {
                        tracing::warn!("authentication failed: invalid bearer token");
                        return unauthorized_response("invalid bearer token");
                    }
                    match actor_from_headers(request.headers()) {
                        Ok(actor) => {
                            request.extensions_mut().insert(actor);
                            next.run(request).await
                        }
                        Err(msg) => {
                            tracing::warn!(reason = %msg, "authentication failed: no caller identity");
                            unauthorized_response(&msg)
                        }
                    }
                }
                Some(_) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            let actor = match actor_from_headers(request.headers()) {
                Ok(actor) => Actor {
                    scopes: Scopes::admin(),
                    ..actor
                },
                Err(_) => Actor::admin(),
            };
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("InvalidAuthToken", message)),
    )
        .into_response()
}
