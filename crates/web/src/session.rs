//! Token-based sessions.
//!
//! A session is a sealed set of [`Claims`] carried by every request in the
//! [`TOKEN_HEADER`] header. Nothing is kept on the server, so a token stays
//! valid until it expires, even when the login it was issued for changes.

use actix_web::{
    HttpMessage,
    HttpRequest,
    FromRequest,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
};
use chrono::{DateTime, Duration, Utc};
use failure::Fail;
use futures::{Future, Poll, future::{self, FutureResult}};
use log::debug;
use newsdesk_error::{ApiError, Error};
use newsdesk_models::{
    Login,
    permissions::{Permission, RequireRolesError, Roles},
};
use newsdesk_util::SealingError;
use serde::{Deserialize, Serialize};
use std::{marker::PhantomData, rc::Rc};

/// Name of the request header carrying a session token.
pub const TOKEN_HEADER: &str = "x-auth-token";

/// Maximal age of a token, after which user will be required to
/// re-authenticate. Defaults to 30 days.
const MAX_DURATION: i64 = 30;

/// Data sealed into a session token.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Claims {
    /// Name of the authenticated user.
    pub user: String,
    /// Roles the user held when the token was issued.
    pub roles: Roles,
    pub issued: DateTime<Utc>,
}

impl Claims {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued > Duration::days(MAX_DURATION) || self.issued > now
    }
}

/// Middleware resolving session tokens into [`Claims`].
///
/// Requests with a missing, malformed, or expired token pass through without
/// a session; it is up to [`Session`] to reject them.
#[derive(Clone)]
pub struct SessionManager {
    /// Secret key used to seal and unseal tokens.
    secret: Vec<u8>,
}

/// Session extractor.
///
/// Extract session data from request or reject it. Requests are rejected
/// when there is no valid token or by the [`Policy`] chosen.
pub struct Session<Policy = Normal> {
    claims: Claims,
    _policy: PhantomData<Policy>,
}

/// Policies govern what sessions can do.
///
/// When implementing a policy you can assume the session itself is valid,
/// as policies are only checked after a token was validated.
pub trait Policy {
    type Error;

    /// Validate a session.
    fn validate(claims: &Claims) -> Validation<Self::Error>;
}

/// Outcome of policy validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Validation<E = Error> {
    /// Let this session through.
    Pass,
    /// Reject this session.
    Reject,
    /// Reject this session with a specific error.
    Error(E),
}

/// Normal policy.
///
/// This policy allows all sessions to pass.
///
/// This is the default policy.
pub struct Normal;

/// Claims of a validated token, stored in request extensions.
struct SessionData(Claims);

impl SessionManager {
    pub fn new(secret: &[u8]) -> SessionManager {
        SessionManager {
            secret: secret.to_vec(),
        }
    }

    /// Issue a token for a login.
    pub fn issue(secret: &[u8], login: &Login) -> Result<String, SealingError> {
        newsdesk_util::seal_to_string(secret, &Claims {
            user: login.username().to_string(),
            roles: login.roles(),
            issued: Utc::now(),
        })
    }

    /// Resolve a token into claims, if it is valid.
    pub fn validate(&self, token: &str) -> Option<Claims> {
        let claims: Claims = match newsdesk_util::unseal_from_str(&self.secret, token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!("Rejecting session token: {}", err);
                return None;
            }
        };

        if claims.is_expired(Utc::now()) {
            debug!("Rejecting expired session token of {}", claims.user);
            return None;
        }

        Some(claims)
    }

    fn before_request(&self, req: &mut ServiceRequest) {
        let claims = req.headers()
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|token| self.validate(token.trim()));

        if let Some(claims) = claims {
            req.extensions_mut().insert(SessionData(claims));
        }
    }
}

impl<S, B> Transform<S> for SessionManager
where
    S: Service<Request = ServiceRequest, Response = ServiceResponse<B>>,
    S::Future: 'static,
    B: 'static,
{
    type Request = ServiceRequest;
    type Response = ServiceResponse<B>;
    type Error = S::Error;
    type Transform = SessionMiddleware<S>;
    type InitError = ();
    type Future = FutureResult<SessionMiddleware<S>, ()>;

    fn new_transform(&self, service: S) -> Self::Future {
        future::ok(SessionMiddleware {
            service,
            manager: Rc::new(self.clone()),
        })
    }
}

pub struct SessionMiddleware<S> {
    service: S,
    manager: Rc<SessionManager>,
}

impl<S, B> Service for SessionMiddleware<S>
where
    S: Service<Request = ServiceRequest, Response = ServiceResponse<B>>,
    S::Future: 'static,
    B: 'static,
{
    type Request = ServiceRequest;
    type Response = ServiceResponse<B>;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self) -> Poll<(), Self::Error> {
        self.service.poll_ready()
    }

    fn call(&mut self, mut req: ServiceRequest) -> Self::Future {
        self.manager.before_request(&mut req);
        self.service.call(req)
    }
}

impl<P> Session<P> {
    /// Name of the authenticated user.
    pub fn user(&self) -> &str {
        &self.claims.user
    }

    pub fn roles(&self) -> Roles {
        self.claims.roles
    }
}

impl<P> std::ops::Deref for Session<P> {
    type Target = Claims;

    fn deref(&self) -> &Claims {
        &self.claims
    }
}

impl<P> FromRequest for Session<P>
where
    P: Policy,
    Error: From<P::Error>,
{
    type Error = Error;
    type Future = Result<Session<P>, Error>;
    type Config = ();

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = match req.extensions().get::<SessionData>() {
            Some(SessionData(claims)) => claims.clone(),
            None => return Err(SessionFromRequestError::NoSession.into()),
        };

        match P::validate(&claims) {
            Validation::Pass => Ok(Session {
                claims,
                _policy: PhantomData,
            }),
            Validation::Reject => Err(SessionFromRequestError::Policy.into()),
            Validation::Error(error) => Err(error.into()),
        }
    }
}

impl Policy for Normal {
    type Error = Error;

    fn validate(_: &Claims) -> Validation {
        Validation::Pass
    }
}

impl<P: Permission> Policy for P {
    type Error = RequireRolesError;

    fn validate(claims: &Claims) -> Validation<RequireRolesError> {
        match claims.roles.require_any(P::bits()) {
            Ok(()) => Validation::Pass,
            Err(err) => Validation::Error(err),
        }
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum SessionFromRequestError {
    /// Token is missing, malformed, or expired. We don't tell which.
    #[api(status = "FORBIDDEN", code = "user:session:required")]
    #[fail(display = "A valid session token is required to access this resource")]
    NoSession,
    /// Session was rejected by policy.
    #[api(status = "FORBIDDEN", code = "user:session:rejected")]
    #[fail(display = "Rejected by policy")]
    Policy,
}
