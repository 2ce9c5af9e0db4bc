use actix_web::{
    FromRequest,
    HttpRequest,
    dev::Payload,
    web::{Bytes, Query},
};
use failure::Fail;
use futures::future::Future;
use newsdesk_error::{ApiError, Error};
use serde::{Deserialize, de::DeserializeOwned};
use std::ops::Deref;

/// Extract an optional JSON value from the request's body.
///
/// An empty body yields `None`. The content type is not checked.
pub struct OptionalJson<T>(pub Option<T>);

impl<T> OptionalJson<T> {
    /// Obtain actual value.
    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> FromRequest for OptionalJson<T>
where
    T: DeserializeOwned + 'static,
{
    type Error = actix_web::Error;
    type Future = Box<dyn Future<Item = Self, Error = actix_web::Error>>;
    type Config = ();

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        Box::new(Bytes::from_request(req, payload).and_then(|body| {
            parse_body(&body).map(OptionalJson).map_err(actix_web::Error::from)
        }))
    }
}

/// Parse a JSON body, treating an empty (or whitespace-only) one as absent.
pub fn parse_body<T>(body: &[u8]) -> Result<Option<T>, Error>
where
    T: DeserializeOwned,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| BadBodyError(err).into())
}

/// Body of a request could not be parsed.
#[derive(ApiError, Debug, Fail)]
#[api(code = "request:bad-body", status = "BAD_REQUEST")]
#[fail(display = "malformed request body: {}", _0)]
pub struct BadBodyError(#[cause] serde_json::Error);

#[derive(Deserialize)]
struct IdParams {
    id: Option<String>,
}

/// Value of the required `id` query argument.
pub struct Id(String);

impl Id {
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for Id {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl FromRequest for Id {
    type Error = Error;
    type Future = Result<Id, Error>;
    type Config = ();

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let params = Query::<IdParams>::from_request(req, payload)
            .map_err(|_| MissingArgumentError("id"))?;

        match params.into_inner().id {
            Some(ref id) if id.trim().is_empty() => Err(MissingArgumentError("id").into()),
            Some(id) => Ok(Id(id.trim().to_string())),
            None => Err(MissingArgumentError("id").into()),
        }
    }
}

/// A required query argument is missing or empty.
#[derive(ApiError, Debug, Fail)]
#[api(code = "request:missing-argument", status = "BAD_REQUEST")]
#[fail(display = "missing required argument {:?}", _0)]
pub struct MissingArgumentError(pub &'static str);

/// Value of the secret key from a request.
///
/// This structure is designed to work with [`actix_web::web::Data`].
pub struct Secret {
    secret: Box<[u8]>,
}

impl Secret {
    /// Construct a new secret.
    pub fn new(secret: &[u8]) -> Self {
        Secret {
            secret: secret.to_vec().into_boxed_slice(),
        }
    }
}

impl Deref for Secret {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.secret
    }
}
